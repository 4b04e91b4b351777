//! Encrypted secret vault access.
//!
//! ```text
//! vault_get ──> confirm ──> ensure unlocked ──> cached secrets ──> Redactor index
//!                              │ (first use)
//!                              └─> password prompt ─> VaultBackend::open
//! ```
//!
//! Decrypted secrets and the password live in [`VaultState`] for one
//! container run and are zeroed by [`VaultState::clear`].

mod backend;
mod command;
mod error;
mod handlers;
mod memory;
mod redact;
mod state;

pub use backend::{SecretMap, VaultBackend, VaultStore};
pub use command::CommandVault;
pub use error::{VaultError, VaultResult};
pub use handlers::{VaultGetHandler, VaultListHandler, VaultService, VaultSetHandler};
pub use memory::MemoryVault;
pub use redact::Redactor;
pub use state::VaultState;
