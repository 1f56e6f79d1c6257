//! File Store
//!
//! JSON persistence shared by the plan file and the progress ledger. Every write replaces
//! the target atomically so readers observe either the previous or the new document.

pub mod persistence;

pub use persistence::{read_json, read_json_or_default, write_json_atomic};
