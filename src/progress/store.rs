//! Durable JSON-backed progress store.
//!
//! The ledger is loaded once when a run starts and rewritten in full after every recorded
//! outcome. Writes go through a temp file and rename, so a crash leaves either the previous
//! or the new ledger on disk.

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::progress::ledger::{Ledger, Outcome, ProgressRecord};
use crate::store::{read_json_or_default, write_json_atomic};

pub struct ProgressStore {
    path: PathBuf,
    ledger: Ledger,
}

impl ProgressStore {
    /// Open the ledger at `path`; a missing file starts an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let ledger = read_json_or_default(&path)?;
        Ok(Self { path, ledger })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Append an outcome and persist the full ledger, whether or not the entry was new.
    pub fn record(&mut self, outcome: Outcome, record: ProgressRecord) -> Result<bool, StorageError> {
        let added = self.ledger.record(outcome, record);
        tracing::debug!(outcome = outcome.as_str(), added, "Recorded invoice outcome");
        self.persist()?;
        Ok(added)
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        write_json_atomic(&self.path, &self.ledger)
    }
}
