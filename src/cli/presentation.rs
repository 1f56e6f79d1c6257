//! CLI presentation: text and json formatters per command.

use crate::catalog::OwnerId;
use crate::executor::RunSummary;
use crate::plan::{Plan, PlanDocument};
use crate::progress::{LedgerSummary, ProgressRecord};
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Per-owner plan breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerRow {
    pub org_id: OwnerId,
    pub invoices: usize,
    pub orders: usize,
    pub total: f64,
    pub leftover_orders: usize,
    pub leftover_amount: f64,
}

/// Owners in production order, then owners with only leftovers.
pub fn owner_rows(plan: &Plan) -> Vec<OwnerRow> {
    fn row_for(rows: &mut Vec<OwnerRow>, org_id: OwnerId) -> usize {
        match rows.iter().position(|r| r.org_id == org_id) {
            Some(i) => i,
            None => {
                rows.push(OwnerRow {
                    org_id,
                    invoices: 0,
                    orders: 0,
                    total: 0.0,
                    leftover_orders: 0,
                    leftover_amount: 0.0,
                });
                rows.len() - 1
            }
        }
    }

    let mut rows: Vec<OwnerRow> = Vec::new();
    for invoice in &plan.invoices {
        let i = row_for(&mut rows, invoice.org_id);
        rows[i].invoices += 1;
        rows[i].orders += invoice.count();
        rows[i].total += invoice.total;
    }
    for (org_id, entries) in &plan.leftover {
        let i = row_for(&mut rows, *org_id);
        rows[i].leftover_orders += entries.len();
        rows[i].leftover_amount += entries.iter().map(|e| e.amount).sum::<f64>();
    }
    rows
}

fn heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_plan_text(plan: &Plan, target_amount: f64, output: &Path, excluded: usize) -> String {
    let summary = plan.summary(target_amount);
    let mut out = heading("Merge Plan");
    out.push_str("\n\n");

    if plan.invoices.is_empty() {
        out.push_str(&format!(
            "{}\n",
            format!("No group of orders reaches ¥{:.2}.", target_amount).yellow()
        ));
    } else {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Org", "Invoices", "Orders", "Total", "Leftover"]);
        for row in owner_rows(plan) {
            table.add_row(vec![
                row.org_id.to_string(),
                row.invoices.to_string(),
                row.orders.to_string(),
                format!("{:.2}", row.total),
                format!("{} (¥{:.2})", row.leftover_orders, row.leftover_amount),
            ]);
        }
        out.push_str(&table.to_string());
        out.push('\n');
    }

    out.push_str(&format!(
        "\nInvoices: {}\nOrders used: {}\nTotal amount: ¥{:.2}\nAverage above target: ¥{:.2}\nLeftover orders: {}\n",
        summary.total_invoices.green(),
        summary.total_orders_used,
        summary.total_amount,
        summary.avg_waste,
        plan.leftover_count()
    ));
    if excluded > 0 {
        out.push_str(&format!(
            "Excluded {} order(s) already merged by completed invoices\n",
            excluded
        ));
    }
    out.push_str(&format!("Plan written to {}", output.display()));
    out
}

pub fn format_plan_json(plan: &Plan, target_amount: f64, output: &Path, excluded: usize) -> String {
    let out = json!({
        "plan_file": output,
        "excluded_completed_orders": excluded,
        "owners": owner_rows(plan),
        "summary": PlanDocument::new(plan, target_amount).summary,
    });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_run_summary_text(summary: &RunSummary) -> String {
    let mut out = heading("Batch Complete");
    out.push_str("\n\n");
    out.push_str(&format!(
        "Planned invoices: {}\nAlready completed: {}\nAttempted this run: {}\n",
        summary.planned, summary.already_completed, summary.attempted
    ));
    out.push_str(&format!(
        "  {} {}\n  {} {}\n  {} {}\n",
        "Completed:".green(),
        summary.completed,
        "Failed:   ".red(),
        summary.failed,
        "Skipped:  ".yellow(),
        summary.skipped
    ));
    out.push_str(&format!("Amount merged this run: ¥{:.2}", summary.completed_amount));
    if let Some(ledger) = &summary.ledger {
        out.push_str(&format!(
            "\n\nLedger totals: {} completed, {} failed, {} skipped, ¥{:.2} merged",
            ledger.completed, ledger.failed, ledger.skipped, ledger.completed_amount
        ));
    }
    out
}

pub fn format_run_summary_json(summary: &RunSummary) -> String {
    serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string())
}

/// Ledger state plus, when a plan file exists, how much of it is left.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub progress_file: PathBuf,
    pub ledger: LedgerSummary,
    pub planned: Option<usize>,
    pub remaining: Option<usize>,
    pub recent_failures: Vec<ProgressRecord>,
}

pub fn format_status_text(report: &StatusReport) -> String {
    let mut out = heading("Merge Progress");
    out.push_str("\n\n");
    out.push_str(&format!("Ledger: {}\n", report.progress_file.display()));

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Completed", "Failed", "Skipped", "Merged amount"]);
    table.add_row(vec![
        report.ledger.completed.to_string(),
        report.ledger.failed.to_string(),
        report.ledger.skipped.to_string(),
        format!("{:.2}", report.ledger.completed_amount),
    ]);
    out.push_str(&table.to_string());
    out.push('\n');

    match (report.planned, report.remaining) {
        (Some(planned), Some(remaining)) => out.push_str(&format!(
            "\nPlan: {} invoice(s), {} remaining\n",
            planned, remaining
        )),
        _ => out.push_str("\nNo plan file found\n"),
    }

    if !report.recent_failures.is_empty() {
        out.push_str(&format!("\n{}\n", "Recent failures:".red()));
        for record in &report.recent_failures {
            out.push_str(&format!(
                "  org {} [{}] {}: {}\n",
                record.org_id,
                record.order_ids.join(","),
                record.time,
                record.message
            ));
        }
    }
    out.trim_end().to_string()
}

pub fn format_status_json(report: &StatusReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}
