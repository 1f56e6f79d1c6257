//! Resuming interrupted runs against an existing ledger.

use crate::integration::scripted_driver::{PageScript, ScriptedDriver};
use crate::integration::test_utils::{
    fast_execution, invoice, invoice_settings, order, sample_catalog, sample_plan,
};
use ivcmerge::executor::MergeExecutor;
use ivcmerge::plan::Plan;
use ivcmerge::progress::{Outcome, ProgressRecord, ProgressStore};
use tempfile::TempDir;

fn progress_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("merge_progress.json")
}

#[tokio::test]
async fn completed_invoices_are_not_resubmitted() {
    let dir = TempDir::new().unwrap();
    let plan = sample_plan();
    let mut store = ProgressStore::open(progress_path(&dir)).unwrap();
    store
        .record(
            Outcome::Completed,
            ProgressRecord::for_invoice(&plan.invoices[0], "allSuccess=true"),
        )
        .unwrap();

    let driver = ScriptedDriver::new(PageScript::default());
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let summary = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();

    assert_eq!(summary.already_completed, 1);
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(driver.commits().len(), 2);

    let submitted: Vec<String> = driver
        .commits()
        .iter()
        .flat_map(|c| c.as_array().cloned().unwrap_or_default())
        .filter_map(|o| o["orderId"].as_str().map(str::to_string))
        .collect();
    for id in &plan.invoices[0].order_ids {
        assert!(!submitted.contains(id), "{} was resubmitted", id);
    }

    let reopened = ProgressStore::open(progress_path(&dir)).unwrap();
    assert_eq!(reopened.ledger().completed.len(), 3);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let plan = sample_plan();
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();

    let driver = ScriptedDriver::new(PageScript::default());
    let mut store = ProgressStore::open(progress_path(&dir)).unwrap();
    MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();
    let after_first = store.ledger().clone();

    let driver = ScriptedDriver::new(PageScript::default());
    let mut store = ProgressStore::open(progress_path(&dir)).unwrap();
    let summary = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();

    assert_eq!(summary.already_completed, 3);
    assert_eq!(summary.attempted, 0);
    assert_eq!(driver.evaluation_count(), 0, "nothing to submit, no preflight");
    assert_eq!(store.ledger(), &after_first);
}

#[tokio::test]
async fn invoice_overlapping_completed_orders_is_skipped_once() {
    let dir = TempDir::new().unwrap();
    let a1 = order("A1", 10, 60.0);
    let a2 = order("A2", 10, 40.0);
    let a3 = order("A3", 10, 70.0);

    let mut store = ProgressStore::open(progress_path(&dir)).unwrap();
    store
        .record(
            Outcome::Completed,
            ProgressRecord::for_invoice(&invoice(10, &[&a1, &a2]), "allSuccess=true"),
        )
        .unwrap();

    // a stale plan that regrouped A2 with A3
    let plan = Plan {
        invoices: vec![invoice(10, &[&a3, &a2])],
        leftover: Default::default(),
    };

    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    for _ in 0..2 {
        let driver = ScriptedDriver::new(PageScript::default());
        MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
            .run(&plan, &mut store)
            .await
            .unwrap();
        assert!(driver.commits().is_empty());
    }

    let ledger = store.ledger();
    assert_eq!(ledger.completed.len(), 1);
    assert_eq!(ledger.skipped.len(), 1);
    assert_eq!(ledger.skipped[0].order_ids, vec!["A3", "A2"]);
    assert!(ledger.skipped[0].message.starts_with("Skipped"));
}

#[tokio::test]
async fn later_success_clears_earlier_failure() {
    let dir = TempDir::new().unwrap();
    let a1 = order("A1", 10, 60.0);
    let a2 = order("A2", 10, 40.0);
    let plan = Plan {
        invoices: vec![invoice(10, &[&a1, &a2])],
        leftover: Default::default(),
    };
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let mut store = ProgressStore::open(progress_path(&dir)).unwrap();

    let failing = ScriptedDriver::new(PageScript {
        ack_status: None,
        ..PageScript::default()
    });
    let summary = MergeExecutor::with_settings(&failing, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(store.ledger().failed.len(), 1);

    let working = ScriptedDriver::new(PageScript::default());
    let summary = MergeExecutor::with_settings(&working, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);

    let reopened = ProgressStore::open(progress_path(&dir)).unwrap();
    assert_eq!(reopened.ledger().completed.len(), 1);
    assert!(reopened.ledger().failed.is_empty());
}
