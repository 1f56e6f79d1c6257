//! Configuration loader: builds one `IvcMergeConfig` from every layer.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::IvcMergeConfig;
use crate::error::MergeError;
use config::File;
use std::path::{Path, PathBuf};

/// Loads and validates configuration.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then global file, then workspace files, then environment.
    pub fn load(workspace_root: &Path) -> Result<IvcMergeConfig, MergeError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(merge_policy::environment()).build()?;
        Self::finish(config)
    }

    /// Defaults, then the given file, then environment. The file must exist.
    pub fn load_from_file(path: &Path) -> Result<IvcMergeConfig, MergeError> {
        if !path.exists() {
            return Err(MergeError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(merge_policy::environment())
            .build()?;
        Self::finish(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    pub fn workspace_config_paths(workspace_root: &Path) -> Vec<PathBuf> {
        workspace_file::workspace_config_paths(workspace_root)
    }

    fn finish(config: config::Config) -> Result<IvcMergeConfig, MergeError> {
        let config: IvcMergeConfig = config.try_deserialize()?;
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            MergeError::ConfigError(messages.join("; "))
        })?;
        tracing::debug!(
            target_amount = config.merge.target_amount,
            max_orders = config.merge.max_orders_per_invoice,
            retry_limit = config.execution.retry_limit,
            "Configuration loaded"
        );
        Ok(config)
    }
}
