//! Merge rules: defaults first, then file layers, then environment.

use crate::config::{MergeConfig, PathsConfig};
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;
use serde::Serialize;

/// Sections seeded key by key. `invoice` and `execution` also accept the older `ivc_*` and
/// `cdp_port` names, so they fall back to serde field defaults; a seeded canonical key would
/// clash with its alias in the merged source.
#[derive(Default, Serialize)]
struct SeededDefaults {
    merge: MergeConfig,
    paths: PathsConfig,
    logging: LoggingConfig,
}

/// Create a Config builder seeded with every built-in default.
///
/// Later sources override individual keys, so a file that only sets `merge.target_amount`
/// keeps every other default intact.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&SeededDefaults::default())?;
    Ok(Config::builder().add_source(defaults))
}

/// `IVCMERGE_MERGE__TARGET_AMOUNT=150` overrides `merge.target_amount`.
pub fn environment() -> Environment {
    Environment::with_prefix("IVCMERGE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
