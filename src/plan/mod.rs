//! Merge planning: data model, the combinatorial planner, and plan file storage.
//! Planning is pure; storage is the only effectful part.

pub mod model;
pub mod planner;
pub mod storage;

pub use model::{IdentityKey, Invoice, LeftoverEntry, Plan, PlanDocument, PlanSummary};
pub use planner::{plan, MergePlanner};
pub use storage::{load_plan, save_plan};
