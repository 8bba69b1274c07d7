//! Configuration IO helpers.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use fnhost_util::expand_tilde;
use tracing::debug;

use crate::config::{ConfigError, HostConfig, interpolate_config, validate_config};

/// Environment variable overriding the default configuration path.
pub const CONFIG_PATH_ENV: &str = "FNHOST_CONFIG_PATH";

/// Returns the default path for the host configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("fnhost").join("host.json")
}

/// Loads host configuration from the default path.
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads host configuration from a specific path.
///
/// A missing file yields the defaults. Files ending in `.json` are parsed as JSON,
/// anything else as YAML.
pub fn load_config_from_path(path: &Path) -> Result<HostConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no host configuration file; using defaults");
        return Ok(HostConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    let mut config: HostConfig = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    interpolate_config(&mut config)?;
    config.storage.root = expand_tilde(&config.storage.root.to_string_lossy());
    validate_config(&config)?;
    debug!(path = %path.display(), "loaded host configuration");
    Ok(config)
}
