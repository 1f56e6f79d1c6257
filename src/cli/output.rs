//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::MergeError;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &MergeError) -> String {
    match e {
        MergeError::SessionUnavailable(reason) => format!(
            "Remote session unavailable: {}\nNo invoice was submitted and the progress ledger was not modified.",
            reason
        ),
        other => other.to_string(),
    }
}
