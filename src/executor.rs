//! Merge Executor
//!
//! Submits planned invoices one at a time through an `AutomationDriver`. Each invoice runs a
//! fixed sequence of steps against the remote form; every outcome is appended to the progress
//! ledger and persisted before the next invoice starts, so a rerun resumes where it stopped.

use crate::catalog::Catalog;
use crate::config::{ExecutionConfig, InvoiceConfig, IvcMergeConfig};
use crate::driver::{AutomationDriver, DriverError, Event};
use crate::error::MergeError;
use crate::plan::{Invoice, Plan};
use crate::progress::{LedgerSummary, Outcome, ProgressRecord, ProgressStore};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub mod page;

pub use page::PageProfile;

/// Longest outcome message kept from a remote payload.
pub const MESSAGE_LIMIT: usize = 200;

/// Per-invoice steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsurePosition,
    SelectMode,
    Stage,
    Commit,
    AwaitAck,
    AwaitReadiness,
    AwaitResult,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::EnsurePosition => "ensure_position",
            Step::SelectMode => "select_mode",
            Step::Stage => "stage",
            Step::Commit => "commit",
            Step::AwaitAck => "await_ack",
            Step::AwaitReadiness => "await_readiness",
            Step::AwaitResult => "await_result",
        };
        f.write_str(name)
    }
}

/// Why one attempt at an invoice failed. Never fatal to the run.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// A referenced record is missing or lacks its payload.
    #[error("{0}")]
    Data(String),

    #[error("{0}")]
    Navigation(String),

    #[error("{0}")]
    Timeout(String),

    /// Structured non-success from the remote side; message is truncated.
    #[error("{0}")]
    Rejected(String),

    #[error("Exception: {0}")]
    Transport(String),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Data(_) => "data",
            AttemptError::Navigation(_) => "navigation",
            AttemptError::Timeout(_) => "timeout",
            AttemptError::Rejected(_) => "rejected",
            AttemptError::Transport(_) => "transport",
        }
    }
}

impl From<DriverError> for AttemptError {
    fn from(err: DriverError) -> Self {
        let message = err.to_string();
        match err {
            DriverError::Timeout { .. } => AttemptError::Timeout(message),
            _ => AttemptError::Transport(message),
        }
    }
}

/// Counts for one `run`, plus the ledger totals afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub planned: usize,
    pub already_completed: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub completed_amount: f64,
    pub ledger: Option<LedgerSummary>,
}

/// Plan invoices partitioned against the ledger before anything is submitted.
#[derive(Debug)]
pub struct Pending<'p> {
    /// Not yet completed and free of already merged orders.
    pub submit: Vec<&'p Invoice>,
    /// Reference at least one order a completed invoice already merged.
    pub overlapping: Vec<&'p Invoice>,
    pub already_completed: usize,
}

impl Pending<'_> {
    pub fn submit_amount(&self) -> f64 {
        self.submit.iter().map(|invoice| invoice.total).sum()
    }
}

pub struct MergeExecutor<'a> {
    driver: &'a dyn AutomationDriver,
    catalog: &'a Catalog,
    invoice: &'a InvoiceConfig,
    execution: &'a ExecutionConfig,
    page: PageProfile,
}

impl<'a> MergeExecutor<'a> {
    pub fn new(
        driver: &'a dyn AutomationDriver,
        catalog: &'a Catalog,
        config: &'a IvcMergeConfig,
    ) -> Self {
        Self::with_settings(driver, catalog, &config.invoice, &config.execution)
    }

    pub fn with_settings(
        driver: &'a dyn AutomationDriver,
        catalog: &'a Catalog,
        invoice: &'a InvoiceConfig,
        execution: &'a ExecutionConfig,
    ) -> Self {
        Self {
            driver,
            catalog,
            invoice,
            execution,
            page: PageProfile::default(),
        }
    }

    pub fn with_page(mut self, page: PageProfile) -> Self {
        self.page = page;
        self
    }

    /// Submit every invoice of `plan` not yet completed in `store`.
    ///
    /// Fails only when the remote session is unusable before the first submission (the
    /// ledger is left untouched) or when the ledger cannot be written.
    pub async fn run(&self, plan: &Plan, store: &mut ProgressStore) -> Result<RunSummary, MergeError> {
        let pending = partition(plan, store);
        let mut summary = RunSummary {
            planned: plan.invoices.len(),
            already_completed: pending.already_completed,
            ..RunSummary::default()
        };

        info!(
            planned = summary.planned,
            already_completed = summary.already_completed,
            remaining = pending.submit.len(),
            stale = pending.overlapping.len(),
            "Starting merge run"
        );

        if !pending.submit.is_empty() {
            self.preflight().await?;
        }

        summary.skipped = record_overlapping(&pending.overlapping, store)?;

        if pending.submit.is_empty() {
            info!("All invoices already completed");
        }

        let planned = plan.invoices.len();
        for (idx, invoice) in pending.submit.iter().enumerate() {
            let number = idx + 1 + summary.already_completed;
            info!(
                org_id = invoice.org_id,
                orders = invoice.count(),
                total = invoice.total,
                "Invoice {}/{}",
                number,
                planned
            );

            summary.attempted += 1;
            let (outcome, message) = self.execute_with_retry(invoice).await;
            let record = ProgressRecord::for_invoice(invoice, message.clone());
            match outcome {
                Outcome::Completed => {
                    info!(org_id = invoice.org_id, "SUCCESS: {}", message);
                    summary.completed += 1;
                    summary.completed_amount += invoice.total;
                }
                _ => {
                    error!(org_id = invoice.org_id, "FAILED: {}", message);
                    summary.failed += 1;
                }
            }
            store.record(outcome, record)?;

            if idx + 1 < pending.submit.len() {
                let delay = random_between(self.execution.delay_min, self.execution.delay_max);
                info!("Waiting {:.1}s before next invoice", delay.as_secs_f64());
                pause(delay).await;
            }
        }

        let ledger = store.ledger().summary();
        info!(
            completed = ledger.completed,
            failed = ledger.failed,
            skipped = ledger.skipped,
            completed_amount = ledger.completed_amount,
            "Batch complete"
        );
        summary.ledger = Some(ledger);
        Ok(summary)
    }

    async fn preflight(&self) -> Result<(), MergeError> {
        let url = self
            .driver
            .evaluate(self.page.location_expr(), self.execution.evaluate_timeout())
            .await
            .map_err(|e| MergeError::SessionUnavailable(e.to_string()))?;
        debug!(url = %page::value_text(&url), "Remote session ready");
        Ok(())
    }

    /// Up to `retry_limit` attempts with randomized backoff; the last attempt's message wins.
    async fn execute_with_retry(&self, invoice: &Invoice) -> (Outcome, String) {
        let limit = self.execution.retry_limit.max(1);
        let mut message = String::new();

        for attempt in 1..=limit {
            if attempt > 1 {
                let delay = random_between(
                    self.execution.retry_backoff_min,
                    self.execution.retry_backoff_max,
                );
                info!(
                    attempt,
                    "Retry {}/{} after {:.1}s",
                    attempt,
                    limit,
                    delay.as_secs_f64()
                );
                pause(delay).await;
            }

            match self.submit(invoice).await {
                Ok(success) => return (Outcome::Completed, success),
                Err(e) => {
                    warn!(attempt, kind = e.kind(), "Attempt failed: {}", e);
                    message = e.to_string();
                }
            }
        }

        (Outcome::Failed, message)
    }

    /// One attempt at one invoice. Returns the success message.
    pub async fn submit(&self, invoice: &Invoice) -> Result<String, AttemptError> {
        let orders = self.stage_orders(invoice)?;

        self.ensure_position().await?;
        self.select_mode().await?;
        self.commit(&orders).await?;
        self.await_ack().await?;
        self.await_readiness().await?;
        self.await_result().await
    }

    /// Collect payloads for every order. Fails before the driver is contacted.
    fn stage_orders(&self, invoice: &Invoice) -> Result<Value, AttemptError> {
        let mut orders = Vec::with_capacity(invoice.count());
        for order_id in &invoice.order_ids {
            let record = self
                .catalog
                .get(order_id)
                .ok_or_else(|| AttemptError::Data(format!("Order {} not found in data", order_id)))?;
            let payload = match &record.payload {
                Some(Value::Null) | None => None,
                Some(Value::Object(map)) if map.is_empty() => None,
                Some(payload) => Some(payload),
            }
            .ok_or_else(|| {
                AttemptError::Data(format!("Order {} missing originalOrderInfo", order_id))
            })?;
            orders.push(json!({
                "orderId": record.order_id,
                "originalOrderInfo": payload,
                "orgId": record.org_id,
                "ivcAmount": record.amount,
            }));
        }
        debug!(step = %Step::Stage, orders = orders.len(), "Staged order payloads");
        Ok(Value::Array(orders))
    }

    async fn eval(&self, expression: &str) -> Result<Value, AttemptError> {
        Ok(self
            .driver
            .evaluate(expression, self.execution.evaluate_timeout())
            .await?)
    }

    async fn location(&self) -> Result<String, AttemptError> {
        let url = self.eval(self.page.location_expr()).await?;
        Ok(page::value_text(&url))
    }

    async fn navigate_to_listing(&self) -> Result<String, AttemptError> {
        self.eval(&self.page.navigate_expr()).await?;
        pause(self.execution.settle(3.0)).await;
        self.location().await
    }

    async fn ensure_position(&self) -> Result<(), AttemptError> {
        let mut url = self.location().await?;
        if self.page.is_aftermath(&url) {
            info!(step = %Step::EnsurePosition, "Navigating back to order list");
            url = self.navigate_to_listing().await?;
        }
        if !self.page.is_listing(&url) {
            warn!(step = %Step::EnsurePosition, url = %url, "Unexpected URL, navigating directly");
            url = self.navigate_to_listing().await?;
            if !self.page.is_listing(&url) {
                return Err(AttemptError::Navigation(format!(
                    "Not on the order list after navigation, URL: {}",
                    url
                )));
            }
        }
        Ok(())
    }

    async fn select_mode(&self) -> Result<(), AttemptError> {
        self.eval(self.page.select_tab_expr()).await?;
        pause(self.execution.settle(2.0)).await;
        self.eval(self.page.check_first_order_expr()).await?;
        pause(self.execution.settle(1.0)).await;
        self.eval(self.page.open_form_expr()).await?;
        pause(self.execution.settle(4.0)).await;

        let url = self.location().await?;
        if !self.page.is_form(&url) {
            return Err(AttemptError::Navigation(format!(
                "Failed to reach form page, URL: {}",
                url
            )));
        }

        let found = self
            .driver
            .find_component(
                &self.page.component_method,
                &self.page.component_handle,
                self.execution.evaluate_timeout(),
            )
            .await?;
        if !found {
            return Err(AttemptError::Navigation(
                "Form component not found on form page".to_string(),
            ));
        }

        self.driver
            .send_command(page::NETWORK_ENABLE_METHOD, json!({}))
            .await?;
        pause(self.execution.settle(0.3)).await;
        let drained = self.driver.drain_pending().await;
        debug!(step = %Step::SelectMode, drained, "Network monitoring enabled");
        Ok(())
    }

    async fn commit(&self, orders: &Value) -> Result<(), AttemptError> {
        let result = self.eval(&self.page.commit_expr(self.invoice, orders)).await?;
        if result.as_str() != Some("OK") {
            return Err(AttemptError::Rejected(truncate(&format!(
                "{} failed: {}",
                self.page.component_method,
                page::value_text(&result)
            ))));
        }
        debug!(step = %Step::Commit, "Commit accepted");
        Ok(())
    }

    async fn await_ack(&self) -> Result<(), AttemptError> {
        let page = &self.page;
        let is_ack = move |event: &Event| page.is_ack(event);
        let event = match self
            .driver
            .await_event(&is_ack, self.execution.ack_timeout())
            .await
        {
            Ok(event) => event,
            Err(DriverError::Timeout { .. }) => {
                return Err(AttemptError::Timeout(
                    "Merge check acknowledgement timed out".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let status = page.ack_status(&event);
        info!(step = %Step::AwaitAck, status = ?status, "Merge check acknowledged");
        if status != Some(200) {
            return Err(AttemptError::Rejected(format!(
                "Merge check failed with HTTP status {}",
                status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
            )));
        }
        Ok(())
    }

    async fn await_readiness(&self) -> Result<(), AttemptError> {
        let expression = self.page.readiness_expr();
        let mut last = String::from("not_ready");
        for poll in 1..=self.execution.readiness_polls {
            pause(self.execution.readiness_interval()).await;
            last = page::value_text(&self.eval(&expression).await?);
            if last == "submitMerge_ok" {
                info!(
                    step = %Step::AwaitReadiness,
                    "Finalize submitted after {:.1}s",
                    poll as f64 * self.execution.readiness_interval
                );
                return Ok(());
            }
        }
        Err(AttemptError::Timeout(format!(
            "Finalize never became ready: {}",
            last
        )))
    }

    async fn await_result(&self) -> Result<String, AttemptError> {
        let deadline = Instant::now() + self.execution.result_timeout();
        let page = &self.page;
        let is_finalize = move |event: &Event| page.is_finalize(event);

        match self
            .driver
            .await_event(&is_finalize, self.execution.result_timeout())
            .await
        {
            Ok(event) => {
                let request_id = page.request_id(&event).ok_or_else(|| {
                    AttemptError::Transport("finalize response without requestId".to_string())
                })?;
                let remaining = deadline.saturating_duration_since(Instant::now());
                let body = self
                    .driver
                    .call(
                        page::RESPONSE_BODY_METHOD,
                        json!({ "requestId": request_id }),
                        remaining,
                    )
                    .await?;
                let body = body.get("body").and_then(Value::as_str).unwrap_or_default();
                debug!(step = %Step::AwaitResult, bytes = body.len(), "Merge result received");
                interpret_result(body)
            }
            Err(DriverError::Timeout { .. }) => {
                let text = page::value_text(&self.eval(page.page_text_expr()).await?);
                if text.contains(page.applied_text.as_str()) {
                    Ok("Success (detected from page text)".to_string())
                } else {
                    Err(AttemptError::Timeout("Merge result timed out".to_string()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Split `plan` into invoices to submit, invoices made stale by completed ones, and
/// invoices already completed.
pub fn partition<'p>(plan: &'p Plan, store: &ProgressStore) -> Pending<'p> {
    let completed_keys = store.ledger().completed_keys();
    let merged_orders = store.ledger().completed_order_ids();
    let mut pending = Pending {
        submit: Vec::new(),
        overlapping: Vec::new(),
        already_completed: 0,
    };

    for invoice in &plan.invoices {
        if completed_keys.contains(&invoice.identity_key()) {
            pending.already_completed += 1;
        } else if invoice.order_ids.iter().any(|id| merged_orders.contains(id)) {
            pending.overlapping.push(invoice);
        } else {
            pending.submit.push(invoice);
        }
    }
    pending
}

/// Record each overlapping invoice as skipped. Returns how many were newly recorded.
pub fn record_overlapping(
    invoices: &[&Invoice],
    store: &mut ProgressStore,
) -> Result<usize, MergeError> {
    let mut skipped = 0;
    for invoice in invoices {
        warn!(
            org_id = invoice.org_id,
            orders = %invoice.identity_key(),
            "Invoice overlaps orders already merged, skipping"
        );
        let record = ProgressRecord::for_invoice(
            invoice,
            "Skipped: orders already merged by a completed invoice",
        );
        if store.record(Outcome::Skipped, record)? {
            skipped += 1;
        }
    }
    Ok(skipped)
}

/// Decide success from the finalize response body.
pub fn interpret_result(body: &str) -> Result<String, AttemptError> {
    let result: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => json!({ "raw": truncate(body) }),
    };

    let accepted = result.get("code").and_then(Value::as_i64) == Some(0)
        && result
            .get("data")
            .and_then(|d| d.get("allSuccess"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

    if accepted {
        Ok("allSuccess=true".to_string())
    } else {
        Err(AttemptError::Rejected(format!(
            "Server rejected: {}",
            truncate(&result.to_string())
        )))
    }
}

pub fn truncate(message: &str) -> String {
    message.chars().take(MESSAGE_LIMIT).collect()
}

fn random_between(min: f64, max: f64) -> Duration {
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs.max(0.0))
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
