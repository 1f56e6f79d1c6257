//! Configuration System
//!
//! One explicit configuration value, built once at startup and passed by reference into the
//! planner and the executor. Sections are layered key-by-key over built-in defaults: global
//! file, workspace file, then `IVCMERGE_*` environment variables.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IvcMergeConfig {
    /// Form values written into every merged invoice
    #[serde(default)]
    pub invoice: InvoiceConfig,

    /// Planner parameters
    #[serde(default)]
    pub merge: MergeConfig,

    /// Executor pacing, retries and deadlines
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Data file locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceConfig {
    #[serde(default, alias = "ivc_title")]
    pub title: String,

    #[serde(default = "default_title_type", alias = "ivc_title_type")]
    pub title_type: i64,

    #[serde(default = "default_invoice_type", alias = "ivc_type")]
    pub invoice_type: i64,

    #[serde(default = "default_content", alias = "ivc_content")]
    pub content: i64,

    #[serde(default = "default_change_reason")]
    pub change_reason: String,
}

fn default_title_type() -> i64 {
    4
}

fn default_invoice_type() -> i64 {
    3
}

fn default_content() -> i64 {
    1
}

fn default_change_reason() -> String {
    "抬头有误".to_string()
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            title_type: default_title_type(),
            invoice_type: default_invoice_type(),
            content: default_content(),
            change_reason: default_change_reason(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Minimum total of every planned invoice
    #[serde(default = "default_target_amount")]
    pub target_amount: f64,

    /// Largest number of orders in one invoice
    #[serde(default = "default_max_orders")]
    pub max_orders_per_invoice: usize,

    /// Optional cap on combinations evaluated per group size (unset = exhaustive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_budget: Option<u64>,
}

fn default_target_amount() -> f64 {
    100.0
}

fn default_max_orders() -> usize {
    10
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            target_amount: default_target_amount(),
            max_orders_per_invoice: default_max_orders(),
            search_budget: None,
        }
    }
}

/// Executor settings. Durations are seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Randomized pause between invoices
    #[serde(default = "default_delay_min")]
    pub delay_min: f64,
    #[serde(default = "default_delay_max")]
    pub delay_max: f64,

    /// Total attempts per invoice
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Randomized pause between attempts of one invoice
    #[serde(default = "default_backoff_min")]
    pub retry_backoff_min: f64,
    #[serde(default = "default_backoff_max")]
    pub retry_backoff_max: f64,

    /// Local port of the remote debugging endpoint
    #[serde(default = "default_remote_port", alias = "cdp_port")]
    pub remote_port: u16,

    /// Substring identifying the remote target to attach to
    #[serde(default = "default_target_match")]
    pub target_match: String,

    #[serde(default = "default_evaluate_timeout")]
    pub evaluate_timeout: f64,
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout: f64,
    #[serde(default = "default_readiness_polls")]
    pub readiness_polls: u32,
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval: f64,
    #[serde(default = "default_result_timeout")]
    pub result_timeout: f64,

    /// Multiplier applied to the fixed UI settle pauses (0 disables them)
    #[serde(default = "default_settle_scale")]
    pub settle_scale: f64,
}

fn default_delay_min() -> f64 {
    4.0
}

fn default_delay_max() -> f64 {
    9.0
}

fn default_retry_limit() -> u32 {
    2
}

fn default_backoff_min() -> f64 {
    3.0
}

fn default_backoff_max() -> f64 {
    6.0
}

fn default_remote_port() -> u16 {
    9444
}

fn default_target_match() -> String {
    "invoice".to_string()
}

fn default_evaluate_timeout() -> f64 {
    30.0
}

fn default_ack_timeout() -> f64 {
    10.0
}

fn default_readiness_polls() -> u32 {
    10
}

fn default_readiness_interval() -> f64 {
    1.5
}

fn default_result_timeout() -> f64 {
    15.0
}

fn default_settle_scale() -> f64 {
    1.0
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            delay_min: default_delay_min(),
            delay_max: default_delay_max(),
            retry_limit: default_retry_limit(),
            retry_backoff_min: default_backoff_min(),
            retry_backoff_max: default_backoff_max(),
            remote_port: default_remote_port(),
            target_match: default_target_match(),
            evaluate_timeout: default_evaluate_timeout(),
            ack_timeout: default_ack_timeout(),
            readiness_polls: default_readiness_polls(),
            readiness_interval: default_readiness_interval(),
            result_timeout: default_result_timeout(),
            settle_scale: default_settle_scale(),
        }
    }
}

impl ExecutionConfig {
    /// Zero-delay settings for driving scripted sessions in tests.
    pub fn immediate() -> Self {
        Self {
            delay_min: 0.0,
            delay_max: 0.0,
            retry_backoff_min: 0.0,
            retry_backoff_max: 0.0,
            readiness_interval: 0.0,
            settle_scale: 0.0,
            ack_timeout: 1.0,
            result_timeout: 1.0,
            evaluate_timeout: 1.0,
            ..Self::default()
        }
    }

    pub fn evaluate_timeout(&self) -> Duration {
        seconds(self.evaluate_timeout)
    }

    pub fn ack_timeout(&self) -> Duration {
        seconds(self.ack_timeout)
    }

    pub fn readiness_interval(&self) -> Duration {
        seconds(self.readiness_interval)
    }

    pub fn result_timeout(&self) -> Duration {
        seconds(self.result_timeout)
    }

    /// Scale a fixed settle pause.
    pub fn settle(&self, secs: f64) -> Duration {
        seconds(secs * self.settle_scale)
    }

    fn validate(&self) -> Result<(), String> {
        if self.retry_limit == 0 {
            return Err("retry_limit must be at least 1".to_string());
        }
        if self.delay_min < 0.0 || self.delay_min > self.delay_max {
            return Err(format!(
                "delay bounds must satisfy 0 <= delay_min <= delay_max (got {}..{})",
                self.delay_min, self.delay_max
            ));
        }
        if self.retry_backoff_min < 0.0 || self.retry_backoff_min > self.retry_backoff_max {
            return Err(format!(
                "retry backoff bounds must satisfy 0 <= min <= max (got {}..{})",
                self.retry_backoff_min, self.retry_backoff_max
            ));
        }
        if self.readiness_polls == 0 {
            return Err("readiness_polls must be at least 1".to_string());
        }
        for (name, value) in [
            ("evaluate_timeout", self.evaluate_timeout),
            ("ack_timeout", self.ack_timeout),
            ("result_timeout", self.result_timeout),
        ] {
            if !(value > 0.0) {
                return Err(format!("{name} must be positive"));
            }
        }
        if self.settle_scale < 0.0 || self.readiness_interval < 0.0 {
            return Err("settle_scale and readiness_interval cannot be negative".to_string());
        }
        Ok(())
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(if value.is_finite() { value.max(0.0) } else { 0.0 })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_orders_file")]
    pub all_orders_file: PathBuf,
    #[serde(default = "default_plan_file")]
    pub merge_plan_file: PathBuf,
    #[serde(default = "default_progress_file")]
    pub merge_progress_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_orders_file() -> PathBuf {
    PathBuf::from("data/all_orders.json")
}

fn default_plan_file() -> PathBuf {
    PathBuf::from("data/merge_plan.json")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("data/merge_progress.json")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("data/batch_merge.log")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            all_orders_file: default_orders_file(),
            merge_plan_file: default_plan_file(),
            merge_progress_file: default_progress_file(),
            log_file: default_log_file(),
        }
    }
}

impl PathsConfig {
    /// Resolve relative paths against the workspace root.
    pub fn resolve(&self, workspace_root: &Path) -> PathsConfig {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace_root.join(p)
            }
        };
        PathsConfig {
            data_dir: join(&self.data_dir),
            all_orders_file: join(&self.all_orders_file),
            merge_plan_file: join(&self.merge_plan_file),
            merge_progress_file: join(&self.merge_progress_file),
            log_file: join(&self.log_file),
        }
    }

    fn validate(&self) -> Result<(), String> {
        for (name, path) in [
            ("data_dir", &self.data_dir),
            ("all_orders_file", &self.all_orders_file),
            ("merge_plan_file", &self.merge_plan_file),
            ("merge_progress_file", &self.merge_progress_file),
            ("log_file", &self.log_file),
        ] {
            if path.as_os_str().is_empty() {
                return Err(format!("{name} cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Merge(String),
    Execution(String),
    Paths(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Merge(msg) => write!(f, "merge: {}", msg),
            ValidationError::Execution(msg) => write!(f, "execution: {}", msg),
            ValidationError::Paths(msg) => write!(f, "paths: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl IvcMergeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.merge.target_amount.is_finite() || self.merge.target_amount <= 0.0 {
            errors.push(ValidationError::Merge(format!(
                "target_amount must be positive (got {})",
                self.merge.target_amount
            )));
        }
        if self.merge.max_orders_per_invoice == 0 {
            errors.push(ValidationError::Merge(
                "max_orders_per_invoice must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.execution.validate() {
            errors.push(ValidationError::Execution(e));
        }
        if let Err(e) = self.paths.validate() {
            errors.push(ValidationError::Paths(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
