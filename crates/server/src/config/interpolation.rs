//! Environment variable interpolation for configuration values.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::HostConfig;

static ENV_REFERENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").expect("env reference regex should compile"));

/// Interpolate `${env:NAME}` references in the key section of the configuration.
pub fn interpolate_config(config: &mut HostConfig) -> Result<(), InterpolationError> {
    if let Some(master) = config.keys.master.as_mut() {
        *master = interpolate_string(master)?;
    }
    for (function, key) in config.keys.functions.iter_mut() {
        *key = interpolate_string(key)?;
        debug!(function = %function, "interpolated function key");
    }
    Ok(())
}

/// Replace every `${env:NAME}` in `value` with the variable's value.
fn interpolate_string(value: &str) -> Result<String, InterpolationError> {
    let mut resolved = Vec::new();
    for capture in ENV_REFERENCE_REGEX.captures_iter(value) {
        let name = capture[1].to_string();
        let env_value = std::env::var(&name).map_err(|_| InterpolationError::MissingEnvVar { name: name.clone() })?;
        debug!(name = %name, "interpolated env var");
        resolved.push((capture[0].to_string(), env_value));
    }

    let mut result = value.to_string();
    for (placeholder, env_value) in resolved {
        result = result.replace(&placeholder, &env_value);
    }
    Ok(result)
}

/// Errors that can occur during interpolation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error("Missing environment variable: {name}")]
    MissingEnvVar { name: String },
}
