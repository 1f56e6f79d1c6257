//! Progress ledger: per-invoice outcomes that make execution resumable.

use crate::catalog::OwnerId;
use crate::plan::{IdentityKey, Invoice};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub org_id: OwnerId,
    pub order_ids: Vec<String>,
    pub total: f64,
    pub time: String,
    pub message: String,
}

impl ProgressRecord {
    pub fn for_invoice(invoice: &Invoice, message: impl Into<String>) -> Self {
        Self {
            org_id: invoice.org_id,
            order_ids: invoice.order_ids.clone(),
            total: invoice.total,
            time: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            message: message.into(),
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::from_ids(self.order_ids.iter().cloned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub completed: Vec<ProgressRecord>,
    #[serde(default)]
    pub failed: Vec<ProgressRecord>,
    #[serde(default)]
    pub skipped: Vec<ProgressRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub completed_amount: f64,
}

impl Ledger {
    pub fn completed_keys(&self) -> HashSet<IdentityKey> {
        self.completed.iter().map(ProgressRecord::identity_key).collect()
    }

    /// Every order id already merged by a completed invoice.
    pub fn completed_order_ids(&self) -> HashSet<String> {
        self.completed
            .iter()
            .flat_map(|r| r.order_ids.iter().cloned())
            .collect()
    }

    pub fn is_completed(&self, key: &IdentityKey) -> bool {
        self.completed.iter().any(|r| &r.identity_key() == key)
    }

    /// Append an outcome. Returns `false` when the entry was redundant and not added:
    /// a second completion of the same identity, or a repeated skip.
    ///
    /// A completion drops earlier failures of the same identity so no identity is ever
    /// both failed and completed.
    pub fn record(&mut self, outcome: Outcome, record: ProgressRecord) -> bool {
        let key = record.identity_key();
        match outcome {
            Outcome::Completed => {
                if self.is_completed(&key) {
                    return false;
                }
                self.failed.retain(|r| r.identity_key() != key);
                self.completed.push(record);
            }
            Outcome::Failed => {
                if self.is_completed(&key) {
                    return false;
                }
                self.failed.push(record);
            }
            Outcome::Skipped => {
                if self.skipped.iter().any(|r| r.identity_key() == key) {
                    return false;
                }
                self.skipped.push(record);
            }
        }
        true
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            completed: self.completed.len(),
            failed: self.failed.len(),
            skipped: self.skipped.len(),
            completed_amount: self.completed.iter().map(|r| r.total).sum(),
        }
    }
}
