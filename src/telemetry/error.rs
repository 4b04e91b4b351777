//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to connect to syslog.
    #[error("failed to connect to syslog: {0}")]
    SyslogConnection(String),

    /// Failed to serialize event to JSON.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Logger already initialized.
    #[error("audit logger already initialized")]
    AlreadyInitialized,
}
