//! Human approval prompts.
//!
//! Every capability grant waits on a [`Prompter`]. Handlers depend only on
//! the trait; [`PopupPrompter`] renders the question as a tmux popup inside
//! the agent's own terminal.

mod error;
mod popup;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{PromptError, PromptResult};
pub use popup::{DECLINED_STATUS, PopupPrompter};

use async_trait::async_trait;
use zeroize::Zeroizing;

/// What a prompt is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Open outbound access to a domain.
    AllowDomain,
    /// Reveal one secret.
    VaultRead,
    /// Reveal the secret names.
    VaultList,
    /// Store one secret.
    VaultWrite,
    /// Enter the vault password.
    VaultUnlock,
}

/// One question for the human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    /// Category, for prompters that render kinds differently.
    pub kind: PromptKind,
    /// Short title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// The domain, key or workspace the question is about.
    pub subject: String,
}

impl PromptRequest {
    /// Approve outbound access to an already-normalized domain.
    pub fn allow_domain(domain: &str) -> Self {
        Self {
            kind: PromptKind::AllowDomain,
            title: "Network access".to_string(),
            message: format!("The agent wants to reach {domain}\nAllow for this session?"),
            subject: domain.to_string(),
        }
    }

    /// Approve reading one secret.
    pub fn vault_read(key: &str) -> Self {
        Self {
            kind: PromptKind::VaultRead,
            title: "Vault read".to_string(),
            message: format!("The agent wants to read secret {key}\nAllow?"),
            subject: key.to_string(),
        }
    }

    /// Approve listing secret names.
    pub fn vault_list() -> Self {
        Self {
            kind: PromptKind::VaultList,
            title: "Vault list".to_string(),
            message: "The agent wants to list secret names\nAllow?".to_string(),
            subject: String::new(),
        }
    }

    /// Approve writing one secret.
    pub fn vault_write(key: &str) -> Self {
        Self {
            kind: PromptKind::VaultWrite,
            title: "Vault write".to_string(),
            message: format!("The agent wants to store secret {key}\nAllow?"),
            subject: key.to_string(),
        }
    }

    /// Ask for the password of a workspace vault.
    pub fn vault_unlock(workspace: &str) -> Self {
        Self {
            kind: PromptKind::VaultUnlock,
            title: "Vault unlock".to_string(),
            message: format!("Enter the vault password for workspace {workspace}"),
            subject: workspace.to_string(),
        }
    }
}

/// Asks a human to decide.
///
/// Calls may block indefinitely; there is no timeout.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Yes/no question. `Ok(false)` is a denial.
    async fn confirm(&self, request: &PromptRequest) -> PromptResult<bool>;

    /// Read a password. Dismissal is [`PromptError::Cancelled`].
    async fn password(&self, request: &PromptRequest) -> PromptResult<Zeroizing<String>>;
}
