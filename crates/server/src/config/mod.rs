//! Host configuration.
//!
//! Handles loading, `${env:NAME}` interpolation, and validation of the host
//! configuration file (`~/.config/fnhost/host.json` by default).

mod interpolation;
mod io;
mod model;
mod validation;

pub use interpolation::{InterpolationError, interpolate_config};
pub use io::{CONFIG_PATH_ENV, default_config_path, load_config, load_config_from_path};
pub use model::{ConfigError, Environment, HostConfig, HttpConfig, KeysConfig, StorageConfig};
pub use validation::{ValidationError, validate_config};
