//! Configuration validation.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::HostConfig;

static ROUTE_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]*$").expect("route prefix regex should compile"));

/// Validate the entire host configuration.
pub fn validate_config(config: &HostConfig) -> Result<(), ValidationError> {
    config.bind_address()?;

    if !ROUTE_PREFIX_REGEX.is_match(&config.http.route_prefix) {
        return Err(ValidationError::InvalidRoutePrefix {
            prefix: config.http.route_prefix.clone(),
            reason: "Route prefix must be a single segment of letters, numbers, underscores, and hyphens".to_string(),
        });
    }

    if config.storage.poll_interval.is_zero() {
        return Err(ValidationError::InvalidStorage {
            reason: "pollInterval must be greater than zero".to_string(),
        });
    }
    if config.storage.max_delivery_attempts == 0 {
        return Err(ValidationError::InvalidStorage {
            reason: "maxDeliveryAttempts must be at least 1".to_string(),
        });
    }

    if config.environment.enforces_keys() && config.keys.master.as_deref().is_none_or(|key| key.trim().is_empty()) {
        return Err(ValidationError::MissingMasterKey);
    }
    for (function, key) in &config.keys.functions {
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyFunctionKey { function: function.clone() });
        }
    }

    debug!(environment = %config.environment, "validated host configuration");
    Ok(())
}

/// Errors that can occur during validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    #[error("Invalid route prefix '{prefix}': {reason}")]
    InvalidRoutePrefix { prefix: String, reason: String },

    #[error("Invalid storage configuration: {reason}")]
    InvalidStorage { reason: String },

    #[error("A master key is required when the environment is hosted")]
    MissingMasterKey,

    #[error("Function key for '{function}' is empty")]
    EmptyFunctionKey { function: String },
}
