//! Global config file source: $XDG_CONFIG_HOME/ivcmerge/config.{json,toml} or the platform config dir.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use directories::BaseDirs;
use std::path::PathBuf;
use tracing::debug;

fn global_config_dir() -> Option<PathBuf> {
    let config_home = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => BaseDirs::new()?.config_dir().to_path_buf(),
    };
    Some(config_home.join("ivcmerge"))
}

/// Path to global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Add global config file sources to builder if they exist. TOML wins over JSON.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(dir) = global_config_dir() else {
        return Ok(builder);
    };
    let mut found = false;
    for name in ["config.json", "config.toml"] {
        let path = dir.join(name);
        if path.exists() {
            builder = builder.add_source(File::from(path).required(false));
            found = true;
        }
    }
    if !found {
        debug!(config_dir = %dir.display(), "No global configuration file");
    }
    Ok(builder)
}
