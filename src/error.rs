//! Error types for the invoice merge planner and executor.

use crate::driver::DriverError;
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors (plan, ledger, catalog files)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Corrupt file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Command-level errors surfaced by the CLI and the executor.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    /// The remote session could not be established before any invoice was attempted.
    #[error("Remote session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Driver error: {0}")]
    DriverError(#[from] DriverError),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl From<config::ConfigError> for MergeError {
    fn from(err: config::ConfigError) -> Self {
        MergeError::ConfigError(err.to_string())
    }
}
