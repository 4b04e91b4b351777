//! Prompt error types.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors from rendering a prompt.
///
/// A denial is not an error; [`super::Prompter::confirm`] returns `false`.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The container runtime could not run the popup.
    #[error("prompt failed: {0}")]
    Runtime(#[from] RuntimeError),

    /// The human dismissed a password prompt.
    #[error("prompt cancelled")]
    Cancelled,

    /// The popup ran but its result could not be used.
    #[error("prompt failed: {0}")]
    Failed(String),
}

/// Result type for prompt operations.
pub type PromptResult<T> = Result<T, PromptError>;
