//! Plan file persistence.

use crate::error::StorageError;
use crate::plan::model::{Plan, PlanDocument};
use crate::store::{read_json, write_json_atomic};
use std::path::Path;
use tracing::info;

/// Save a plan with its summary computed against `target_amount`.
pub fn save_plan(plan: &Plan, target_amount: f64, path: &Path) -> Result<(), StorageError> {
    write_json_atomic(path, &PlanDocument::new(plan, target_amount))?;
    info!(
        path = %path.display(),
        invoices = plan.total_invoices(),
        "Plan saved"
    );
    Ok(())
}

/// Load a plan file and check its structural invariants.
pub fn load_plan(path: &Path) -> Result<Plan, StorageError> {
    let document: PlanDocument = read_json(path)?;
    let plan = document.into_plan();
    plan.check_integrity().map_err(|reason| StorageError::Corrupt {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(plan)
}
