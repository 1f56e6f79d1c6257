//! CLI parse: clap types for ivcmerge. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ivcmerge - plan and submit merged invoices
#[derive(Parser)]
#[command(name = "ivcmerge")]
#[command(about = "Group reimbursable orders into merged invoices and submit them resumably")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a merge plan from the order export
    Plan {
        /// Order export (defaults to paths.all_orders_file)
        #[arg(long)]
        orders: Option<PathBuf>,
        /// Minimum total per invoice (defaults to merge.target_amount)
        #[arg(long)]
        target: Option<f64>,
        /// Maximum orders per invoice (defaults to merge.max_orders_per_invoice)
        #[arg(long)]
        max_size: Option<usize>,
        /// Cap on combinations evaluated per group size
        #[arg(long)]
        search_budget: Option<u64>,
        /// Plan file to write (defaults to paths.merge_plan_file)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep orders already merged by completed invoices
        #[arg(long)]
        include_completed: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Submit every invoice of the plan not yet completed
    Run {
        /// Plan file (defaults to paths.merge_plan_file)
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Order export (defaults to paths.all_orders_file)
        #[arg(long)]
        orders: Option<PathBuf>,
        /// Remote page websocket URL (skips target discovery)
        #[arg(long)]
        ws_url: Option<String>,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show progress ledger totals
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config,
}
