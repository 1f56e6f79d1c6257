//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to planner, executor and ledger.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_plan_json, format_plan_text, format_run_summary_json, format_run_summary_text,
    format_status_json, format_status_text, OwnerRow, StatusReport,
};
pub use route::RunContext;
