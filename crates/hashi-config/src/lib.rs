//! # hashi-config
//!
//! Layered configuration for the hashi endpoint:
//! defaults → optional TOML file → `HASHI_*` environment variables.

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{HashiConfig, KeepaliveConfig, LoggingConfig, ServerConfig};
