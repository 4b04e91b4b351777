//! Error types for firewall operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors from domain normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// Input was empty or whitespace.
    #[error("empty domain")]
    Empty,

    /// Input is not a hostname, IPv4, IPv6 or `localhost`.
    #[error("invalid entry: {0:?}")]
    Invalid(String),
}

/// Unified error type for firewall control.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// Domain failed normalization.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Container runtime command failed.
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The internal network's address range could not be determined.
    #[error("could not determine address range of network '{0}'")]
    UnknownSubnet(String),

    /// Container name cannot be used as a session file name.
    #[error("invalid container name: {0:?}")]
    InvalidContainerName(String),

    /// Reading or writing a firewall state file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Path that was being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A blocking state-file task panicked or was cancelled.
    #[error("firewall state task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for firewall operations.
pub type FirewallResult<T> = Result<T, FirewallError>;
