//! Configuration schema.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashiConfig {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Keepalive settings.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Lower bound of the loopback port range (inclusive).
    pub port_min: u16,
    /// Upper bound of the loopback port range (inclusive).
    pub port_max: u16,
    /// Pre-shared token clients must present during the handshake.
    /// When unset, any local client is accepted.
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port_min: 10800,
            port_max: 10899,
            auth_token: None,
        }
    }
}

/// Keepalive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Ping interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
