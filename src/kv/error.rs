//! Scratch store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from scratch store operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// Request carried no key.
    #[error("key is required")]
    MissingKey,

    /// Store file could not be read or written.
    #[error("IO error at {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Store file is not a JSON object of strings.
    #[error("corrupt store {path:?}: {source}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Encoding the store failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking store task panicked or was cancelled.
    #[error("scratch store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for scratch store operations.
pub type KvResult<T> = Result<T, KvError>;
