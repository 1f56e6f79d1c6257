//! Execution progress: the outcome ledger and its durable store.

pub mod ledger;
pub mod store;

pub use ledger::{Ledger, LedgerSummary, Outcome, ProgressRecord};
pub use store::ProgressStore;
