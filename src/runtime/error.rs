//! Container runtime error types.

use thiserror::Error;

/// Errors from container runtime commands.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be spawned.
    #[error("failed to run '{cmd}': {source}")]
    CommandFailed {
        /// The command line that failed.
        cmd: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited non-zero.
    #[error("'{cmd}' failed: {stderr}")]
    CommandError {
        /// The command line that failed.
        cmd: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The command produced output we could not interpret.
    #[error("unexpected output from '{cmd}': {message}")]
    UnexpectedOutput {
        /// The command line.
        cmd: String,
        /// What was wrong.
        message: String,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
