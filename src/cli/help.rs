//! CLI command-name contract for logging.

use crate::cli::parse::Commands;

/// Command name string used in log fields (e.g. "plan", "run").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Plan { .. } => "plan",
        Commands::Run { .. } => "run",
        Commands::Status { .. } => "status",
        Commands::Config => "config",
    }
}
