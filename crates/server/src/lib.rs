//! Trigger listeners and host lifecycle for Fnhost.
//!
//! [`HostServer`] wires a frozen function registry to a blob store, starts the
//! HTTP, timer, and blob listeners, and hands back a [`RunningHost`] whose
//! [`RunningHost::stop`] performs a graceful shutdown.

pub mod config;
pub mod listeners;
mod server;

pub use config::{ConfigError, Environment, HostConfig, load_config, load_config_from_path};
pub use server::{HostServer, RunningHost};
