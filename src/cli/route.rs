//! CLI route: single route table and run context. Dispatches to planner, executor and ledger.

use crate::catalog::Catalog;
use crate::config::{ConfigLoader, IvcMergeConfig, MergeConfig, PathsConfig};
use crate::driver::{discover_target, CdpDriver};
use crate::error::MergeError;
use crate::executor::{partition, record_overlapping, MergeExecutor};
use crate::plan::{load_plan, save_plan, MergePlanner};
use crate::progress::ProgressStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::command_name;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_plan_json, format_plan_text, format_run_summary_json, format_run_summary_text,
    format_status_json, format_status_text, StatusReport,
};

const RECENT_FAILURES: usize = 5;

/// Runtime context for CLI execution: workspace, effective configuration and resolved paths.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    config: IvcMergeConfig,
    paths: PathsConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, MergeError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self::from_config(config, &workspace_root))
    }

    pub fn from_config(config: IvcMergeConfig, workspace_root: &Path) -> Self {
        let paths = config.paths.resolve(workspace_root);
        Self { config, paths }
    }

    pub fn config(&self) -> &IvcMergeConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, MergeError> {
        info!(command = command_name(command), "Executing command");
        match command {
            Commands::Plan {
                orders,
                target,
                max_size,
                search_budget,
                output,
                include_completed,
                format,
            } => self.handle_plan(PlanRequest {
                orders: orders.as_deref(),
                target: *target,
                max_size: *max_size,
                search_budget: *search_budget,
                output: output.as_deref(),
                include_completed: *include_completed,
                format,
            }),
            Commands::Run {
                plan,
                orders,
                ws_url,
                yes,
                format,
            } => self.handle_run(RunRequest {
                plan: plan.as_deref(),
                orders: orders.as_deref(),
                ws_url: ws_url.as_deref(),
                yes: *yes,
                format,
            }),
            Commands::Status { format } => self.handle_status(format),
            Commands::Config => self.handle_config(),
        }
    }

    fn handle_plan(&self, request: PlanRequest<'_>) -> Result<String, MergeError> {
        let orders_path = request.orders.unwrap_or(&self.paths.all_orders_file);
        let output = request.output.unwrap_or(&self.paths.merge_plan_file);
        let defaults = &self.config.merge;
        let planner = MergePlanner::from_config(&MergeConfig {
            target_amount: request.target.unwrap_or(defaults.target_amount),
            max_orders_per_invoice: request.max_size.unwrap_or(defaults.max_orders_per_invoice),
            search_budget: request.search_budget.or(defaults.search_budget),
        })?;

        let catalog = Catalog::load(orders_path)?;
        let merged: HashSet<String> = if request.include_completed {
            HashSet::new()
        } else {
            ProgressStore::open(&self.paths.merge_progress_file)?
                .ledger()
                .completed_order_ids()
        };
        let records = catalog.without(&merged);
        let excluded = catalog.len() - records.len();
        info!(
            orders = catalog.len(),
            excluded,
            target = planner.target_amount(),
            max_size = planner.max_group_size(),
            "Planning merge"
        );

        let plan = planner.plan(&records);
        save_plan(&plan, planner.target_amount(), output)?;

        if request.format == "json" {
            Ok(format_plan_json(&plan, planner.target_amount(), output, excluded))
        } else {
            Ok(format_plan_text(&plan, planner.target_amount(), output, excluded))
        }
    }

    fn handle_run(&self, request: RunRequest<'_>) -> Result<String, MergeError> {
        let plan = load_plan(request.plan.unwrap_or(&self.paths.merge_plan_file))?;
        let catalog = Catalog::load(request.orders.unwrap_or(&self.paths.all_orders_file))?;
        let mut store = ProgressStore::open(&self.paths.merge_progress_file)?;

        let pending = partition(&plan, &store);
        if pending.submit.is_empty() {
            let skipped = record_overlapping(&pending.overlapping, &mut store)?;
            if skipped > 0 {
                return Ok(format!(
                    "Nothing to submit: {} invoice(s) overlap already merged orders and were skipped.",
                    skipped
                ));
            }
            return Ok(format!(
                "All {} planned invoice(s) already completed.",
                plan.invoices.len()
            ));
        }
        let (remaining, amount) = (pending.submit.len(), pending.submit_amount());

        if !request.yes {
            use dialoguer::Confirm;
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Submit {} merged invoice(s) totalling ¥{:.2}?",
                    remaining, amount
                ))
                .interact()
                .map_err(|e| MergeError::Cancelled(format!("no confirmation: {}", e)))?;

            if !confirmed {
                return Ok("Run cancelled".to_string());
            }
        }

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| MergeError::ConfigError(format!("Failed to create runtime: {}", e)))?;
        let summary = runtime.block_on(async {
            let ws_url = match request.ws_url {
                Some(url) => url.to_string(),
                None => discover_target(
                    self.config.execution.remote_port,
                    &self.config.execution.target_match,
                )
                .await
                .map_err(|e| MergeError::SessionUnavailable(e.to_string()))?,
            };
            let driver = CdpDriver::connect(&ws_url)
                .await
                .map_err(|e| MergeError::SessionUnavailable(e.to_string()))?;

            MergeExecutor::new(&driver, &catalog, &self.config)
                .run(&plan, &mut store)
                .await
        })?;

        if request.format == "json" {
            Ok(format_run_summary_json(&summary))
        } else {
            Ok(format_run_summary_text(&summary))
        }
    }

    fn handle_status(&self, format: &str) -> Result<String, MergeError> {
        let store = ProgressStore::open(&self.paths.merge_progress_file)?;
        let ledger = store.ledger();

        let plan_file = &self.paths.merge_plan_file;
        let (planned, remaining) = if plan_file.exists() {
            let plan = load_plan(plan_file)?;
            let remaining = partition(&plan, &store).submit.len();
            (Some(plan.invoices.len()), Some(remaining))
        } else {
            (None, None)
        };

        let report = StatusReport {
            progress_file: store.path().to_path_buf(),
            ledger: ledger.summary(),
            planned,
            remaining,
            recent_failures: ledger
                .failed
                .iter()
                .rev()
                .take(RECENT_FAILURES)
                .cloned()
                .collect(),
        };

        if format == "json" {
            Ok(format_status_json(&report))
        } else {
            Ok(format_status_text(&report))
        }
    }

    fn handle_config(&self) -> Result<String, MergeError> {
        toml::to_string_pretty(&self.config)
            .map_err(|e| MergeError::ConfigError(format!("Failed to render configuration: {}", e)))
    }
}

struct RunRequest<'r> {
    plan: Option<&'r Path>,
    orders: Option<&'r Path>,
    ws_url: Option<&'r str>,
    yes: bool,
    format: &'r str,
}

struct PlanRequest<'r> {
    orders: Option<&'r Path>,
    target: Option<f64>,
    max_size: Option<usize>,
    search_budget: Option<u64>,
    output: Option<&'r Path>,
    include_completed: bool,
    format: &'r str,
}
