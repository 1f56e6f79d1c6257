//! ivcmerge CLI Binary
//!
//! Command-line interface for planning and submitting merged invoices.

use clap::Parser;
use ivcmerge::cli::{Cli, RunContext};
use ivcmerge::config::{ConfigLoader, IvcMergeConfig};
use ivcmerge::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("ivcmerge starting");

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", ivcmerge::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", ivcmerge::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args, environment, and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let loaded = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path).ok()
    } else {
        ConfigLoader::load(&cli.workspace).ok()
    };
    let loaded = loaded.unwrap_or_else(IvcMergeConfig::default);
    let mut config = loaded.logging.clone();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }

    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    } else if config.file.is_none() {
        config.file = Some(loaded.paths.resolve(&cli.workspace).log_file);
    }

    config
}
