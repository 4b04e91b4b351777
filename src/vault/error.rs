//! Vault error types.

use std::io;
use thiserror::Error;

use crate::prompt::PromptError;

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Request carried no key.
    #[error("key is required")]
    MissingKey,

    /// Key outside the `[A-Za-z0-9_]+` namespace.
    #[error("invalid key {0:?}: only letters, digits and underscore are allowed")]
    InvalidKey(String),

    /// Write request carried no value.
    #[error("value is required")]
    EmptyValue,

    /// Key absent from the store.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The backing store refused to open.
    #[error("unlock failed: {0}")]
    Unlock(String),

    /// Operation needs an unlocked vault.
    #[error("vault is locked")]
    Locked,

    /// Prompt plumbing failed or the password prompt was dismissed.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The external helper exited non-zero.
    #[error("vault helper `{command}` failed: {stderr}")]
    Helper {
        /// Command that was run.
        command: String,
        /// Helper's stderr.
        stderr: String,
    },

    /// The external helper produced output that could not be parsed.
    #[error("vault helper returned malformed output: {0}")]
    Malformed(String),

    /// IO error talking to the helper.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
