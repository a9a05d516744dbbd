//! Endpoint error types.

use thiserror::Error;

/// Errors surfaced by the endpoint lifecycle and outbound API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called while the endpoint is already running.
    #[error("Server already running")]
    AlreadyRunning,
    /// `stop` (or an outbound call) was made while the endpoint is not running.
    #[error("Server not running")]
    NotRunning,
    /// No port in the configured range could be bound on 127.0.0.1.
    #[error("no available port in range {min}-{max}")]
    NoAvailablePort {
        /// Lower bound of the attempted range.
        min: u16,
        /// Upper bound of the attempted range.
        max: u16,
    },
    /// The configured port range is empty (min > max).
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange {
        /// Lower bound.
        min: u16,
        /// Upper bound.
        max: u16,
    },
}
