//! Workspace config file source: config.toml or config.json at the workspace root.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

const WORKSPACE_FILES: [&str; 2] = ["config.json", "config.toml"];

/// Existing workspace config files, in the order they are layered.
pub fn workspace_config_paths(workspace_root: &Path) -> Vec<PathBuf> {
    WORKSPACE_FILES
        .iter()
        .map(|name| workspace_root.join(name))
        .filter(|path| path.exists())
        .collect()
}

/// Add workspace config files to builder. `config.toml` wins over `config.json` key by key.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for path in workspace_config_paths(workspace_root) {
        builder = builder.add_source(File::from(path).required(false));
    }
    Ok(builder)
}
