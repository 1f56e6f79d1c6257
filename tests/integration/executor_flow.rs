//! Executor behaviour against a scripted page.

use crate::integration::scripted_driver::{
    PageScript, ScriptedDriver, ACCEPTED_BODY, LISTING_URL, SUCCESS_URL,
};
use crate::integration::test_utils::{
    fast_execution, invoice, invoice_settings, order, sample_catalog, sample_plan,
};
use ivcmerge::catalog::{Catalog, Record};
use ivcmerge::config::ExecutionConfig;
use ivcmerge::error::MergeError;
use ivcmerge::executor::{MergeExecutor, PageProfile, MESSAGE_LIMIT};
use ivcmerge::plan::Plan;
use ivcmerge::progress::ProgressStore;
use tempfile::TempDir;

fn single_invoice_plan() -> Plan {
    let a1 = order("A1", 10, 60.0);
    let a2 = order("A2", 10, 40.0);
    Plan {
        invoices: vec![invoice(10, &[&a1, &a2])],
        leftover: Default::default(),
    }
}

fn open_store(dir: &TempDir) -> ProgressStore {
    ProgressStore::open(dir.path().join("merge_progress.json")).unwrap()
}

async fn run_single(script: PageScript, execution: &ExecutionConfig) -> (ScriptedDriver, ProgressStore) {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(script);
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let mut store = open_store(&dir);

    MergeExecutor::with_settings(&driver, &catalog, &settings, execution)
        .run(&single_invoice_plan(), &mut store)
        .await
        .unwrap();
    (driver, store)
}

fn only_failure(store: &ProgressStore) -> String {
    let ledger = store.ledger();
    assert!(ledger.completed.is_empty());
    assert_eq!(ledger.failed.len(), 1, "exactly one failure per invoice");
    ledger.failed[0].message.clone()
}

#[tokio::test]
async fn happy_path_completes_every_invoice() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(PageScript::default());
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let mut store = open_store(&dir);
    let plan = sample_plan();
    assert_eq!(plan.invoices.len(), 3);

    let summary = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .run(&plan, &mut store)
        .await
        .unwrap();

    assert_eq!(summary.planned, 3);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.completed_amount, 325.0);
    assert_eq!(summary.ledger.as_ref().unwrap().completed, 3);

    let ledger = store.ledger();
    assert_eq!(ledger.completed.len(), 3);
    assert!(ledger.completed.iter().all(|r| r.message == "allSuccess=true"));

    // the stale acknowledgement queued before monitoring must not be consumed
    assert!(driver.drained() >= 1);
    assert!(driver.commands().iter().all(|c| c == "Network.enable"));
    assert_eq!(driver.commands().len(), 3);

    let commits = driver.commits();
    assert_eq!(commits.len(), 3);
    let first = commits[0].as_array().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0]["orderId"], "A1");
    assert_eq!(first[0]["orgId"], 10);
    assert_eq!(first[0]["ivcAmount"], 60.0);
    assert_eq!(first[0]["originalOrderInfo"]["orderId"], "A1");

    // progress survives a reopen
    let reopened = open_store(&dir);
    assert_eq!(reopened.ledger().completed.len(), 3);
}

#[tokio::test]
async fn starts_from_aftermath_page() {
    let script = PageScript {
        start_url: SUCCESS_URL.to_string(),
        ..PageScript::default()
    };
    let (driver, store) = run_single(script, &fast_execution()).await;

    assert_eq!(driver.navigations(), 1);
    assert_eq!(store.ledger().completed.len(), 1);
}

#[tokio::test]
async fn unknown_page_navigates_once_then_continues() {
    let script = PageScript {
        start_url: "https://invoice-m.jd.com/#/home".to_string(),
        ..PageScript::default()
    };
    let (driver, store) = run_single(script, &fast_execution()).await;

    assert_eq!(driver.navigations(), 1);
    assert_eq!(store.ledger().completed.len(), 1);
}

#[tokio::test]
async fn navigation_failure_is_recorded() {
    let script = PageScript {
        start_url: "https://invoice-m.jd.com/#/home".to_string(),
        navigation_works: false,
        ..PageScript::default()
    };
    let (driver, store) = run_single(script, &fast_execution()).await;

    assert_eq!(
        only_failure(&store),
        "Not on the order list after navigation, URL: https://invoice-m.jd.com/#/home"
    );
    assert!(driver.commits().is_empty());
}

#[tokio::test]
async fn form_that_never_opens_is_a_navigation_failure() {
    let script = PageScript {
        form_opens: false,
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(
        only_failure(&store),
        format!("Failed to reach form page, URL: {}", LISTING_URL)
    );
}

#[tokio::test]
async fn missing_form_component() {
    let script = PageScript {
        component_present: false,
        ..PageScript::default()
    };
    let (driver, store) = run_single(script, &fast_execution()).await;

    assert_eq!(only_failure(&store), "Form component not found on form page");
    assert!(driver.commits().is_empty());
}

#[tokio::test]
async fn ack_timeout() {
    let script = PageScript {
        ack_status: None,
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(only_failure(&store), "Merge check acknowledgement timed out");
}

#[tokio::test]
async fn ack_with_error_status() {
    let script = PageScript {
        ack_status: Some(500),
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(only_failure(&store), "Merge check failed with HTTP status 500");
}

#[tokio::test]
async fn commit_error_reported_with_method_name() {
    let script = PageScript {
        commit_reply: "commit_error: groupList is undefined".to_string(),
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(
        only_failure(&store),
        "commitBatchHkfpReq failed: commit_error: groupList is undefined"
    );
}

#[tokio::test]
async fn finalize_never_ready() {
    let script = PageScript {
        readiness: vec!["waiting_groupList".to_string()],
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(
        only_failure(&store),
        "Finalize never became ready: waiting_groupList"
    );
}

#[tokio::test]
async fn page_text_fallback_counts_as_success() {
    let script = PageScript {
        finalize_body: None,
        page_text: "换开记录 已申请 查看详情".to_string(),
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    let ledger = store.ledger();
    assert_eq!(ledger.completed.len(), 1);
    assert_eq!(
        ledger.completed[0].message,
        "Success (detected from page text)"
    );
}

#[tokio::test]
async fn page_text_marker_comes_from_profile() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(PageScript {
        finalize_body: None,
        page_text: "Request submitted".to_string(),
        ..PageScript::default()
    });
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let mut store = open_store(&dir);
    let page = PageProfile {
        applied_text: "submitted".to_string(),
        ..PageProfile::default()
    };

    MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .with_page(page)
        .run(&single_invoice_plan(), &mut store)
        .await
        .unwrap();
    assert_eq!(store.ledger().completed.len(), 1);
}

#[tokio::test]
async fn missing_result_without_page_text_times_out() {
    let script = PageScript {
        finalize_body: None,
        page_text: "订单列表".to_string(),
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    assert_eq!(only_failure(&store), "Merge result timed out");
}

#[tokio::test]
async fn server_rejection_is_truncated() {
    let body = format!(
        r#"{{"code":0,"data":{{"allSuccess":false,"detail":"{}"}}}}"#,
        "x".repeat(1000)
    );
    let script = PageScript {
        finalize_body: Some(body),
        ..PageScript::default()
    };
    let (_, store) = run_single(script, &fast_execution()).await;

    let message = only_failure(&store);
    assert!(message.starts_with("Server rejected: "));
    assert_eq!(
        message.chars().count(),
        "Server rejected: ".chars().count() + MESSAGE_LIMIT
    );
}

#[tokio::test]
async fn data_error_never_reaches_the_page() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(PageScript::default());
    // A2 lacks a payload, Z9 is absent entirely
    let catalog = Catalog::new(vec![order("A1", 10, 60.0), Record::new("A2", 10, 40.0)]);
    let settings = invoice_settings();
    let execution = fast_execution();
    let executor = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution);

    let a1 = order("A1", 10, 60.0);
    let z9 = order("Z9", 10, 40.0);
    let err = executor.submit(&invoice(10, &[&a1, &z9])).await.unwrap_err();
    assert_eq!(err.kind(), "data");
    assert_eq!(err.to_string(), "Order Z9 not found in data");
    assert_eq!(driver.evaluation_count(), 0);

    let mut store = open_store(&dir);
    executor.run(&single_invoice_plan(), &mut store).await.unwrap();
    assert_eq!(only_failure(&store), "Order A2 missing originalOrderInfo");
    // preflight only
    assert_eq!(driver.evaluation_count(), 1);
    assert!(driver.commits().is_empty());
}

#[tokio::test]
async fn retries_are_bounded_by_limit() {
    let script = PageScript {
        commit_reply: "commit_error: busy".to_string(),
        ..PageScript::default()
    };
    let execution = ExecutionConfig {
        retry_limit: 3,
        ..fast_execution()
    };
    let (driver, store) = run_single(script, &execution).await;

    assert_eq!(driver.commits().len(), 3);
    assert_eq!(only_failure(&store), "commitBatchHkfpReq failed: commit_error: busy");
}

#[tokio::test]
async fn retry_recovers_after_transient_failure() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(PageScript {
        ack_status: Some(503),
        ..PageScript::default()
    });
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let mut store = open_store(&dir);
    let executor = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution);

    let a1 = order("A1", 10, 60.0);
    let a2 = order("A2", 10, 40.0);
    let first = executor.submit(&invoice(10, &[&a1, &a2])).await.unwrap_err();
    assert_eq!(first.kind(), "rejected");

    driver.set_script(PageScript::default());
    executor.run(&single_invoice_plan(), &mut store).await.unwrap();
    assert_eq!(store.ledger().completed.len(), 1);
    assert!(store.ledger().failed.is_empty());
}

#[tokio::test]
async fn unusable_session_fails_before_touching_the_ledger() {
    let dir = TempDir::new().unwrap();
    let driver = ScriptedDriver::new(PageScript {
        unreachable: true,
        ..PageScript::default()
    });
    let catalog = sample_catalog();
    let settings = invoice_settings();
    let execution = fast_execution();
    let mut store = open_store(&dir);

    let err = MergeExecutor::with_settings(&driver, &catalog, &settings, &execution)
        .run(&sample_plan(), &mut store)
        .await
        .unwrap_err();

    assert!(matches!(err, MergeError::SessionUnavailable(_)));
    assert!(!dir.path().join("merge_progress.json").exists());
    assert_eq!(store.ledger().summary().completed, 0);
}

#[tokio::test]
async fn accepted_body_constant_matches_success_rule() {
    assert_eq!(
        ivcmerge::executor::interpret_result(ACCEPTED_BODY).unwrap(),
        "allSuccess=true"
    );
}
