//! Data models for host configuration.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fnhost_types::duration::serde_duration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{InterpolationError, ValidationError};

/// Where the host runs, which decides whether HTTP keys are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Developer machine: no key checks.
    #[default]
    Local,
    /// Shared deployment: function and admin keys are required.
    Hosted,
}

impl Environment {
    pub fn enforces_keys(&self) -> bool {
        matches!(self, Environment::Hosted)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Hosted => write!(f, "hosted"),
        }
    }
}

/// Host configuration, usually read from `host.json` or `host.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// How long shutdown waits for in-flight invocations before aborting them.
    #[serde(default = "default_shutdown_grace_period", with = "serde_duration")]
    pub shutdown_grace_period: Duration,
    #[serde(default)]
    pub keys: KeysConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            shutdown_grace_period: default_shutdown_grace_period(),
            keys: KeysConfig::default(),
        }
    }
}

impl HostConfig {
    /// The HTTP bind address as a socket address.
    pub fn bind_address(&self) -> Result<SocketAddr, ValidationError> {
        self.http.bind_address.parse().map_err(|error: std::net::AddrParseError| ValidationError::InvalidBindAddress {
            address: self.http.bind_address.clone(),
            reason: error.to_string(),
        })
    }
}

/// Settings for the HTTP trigger listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpConfig {
    /// Socket address to listen on (for example, "127.0.0.1:7071").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// First path segment of every function route. Empty serves functions at the root.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            route_prefix: default_route_prefix(),
        }
    }
}

/// Settings for the blob store and the blob trigger listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory backing the blob store. `~` is expanded on load.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_poll_interval", with = "serde_duration")]
    pub poll_interval: Duration,
    /// Deliveries of one blob version before it is considered poisoned.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            poll_interval: default_poll_interval(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

/// Access keys checked when the environment is hosted.
///
/// Values may reference environment variables as `${env:NAME}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeysConfig {
    #[serde(default)]
    pub master: Option<String>,
    /// Function name to function key.
    #[serde(default)]
    pub functions: IndexMap<String, String>,
}

fn default_bind_address() -> String {
    "127.0.0.1:7071".to_string()
}

fn default_route_prefix() -> String {
    "api".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delivery_attempts() -> u32 {
    5
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(10)
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}
