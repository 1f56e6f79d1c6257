//! ivcmerge: Resumable Invoice Merging
//!
//! Groups reimbursable orders into merged invoices that each reach a minimum total, then
//! submits them one at a time through a remote automation channel, recording every outcome
//! in a durable ledger so an interrupted run resumes where it stopped.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod logging;
pub mod plan;
pub mod progress;
pub mod store;
