//! Backing store abstraction.
//!
//! The encryption format lives outside this crate. A [`VaultBackend`] opens
//! a workspace's store with a password; the resulting [`VaultStore`] is used
//! for one short burst of reads or writes, then closed.

use std::collections::HashMap;

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::error::VaultResult;

/// Decrypted secrets, key to value.
pub type SecretMap = HashMap<String, Zeroizing<String>>;

/// Opens encrypted per-workspace stores.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Open `workspace`'s store. A wrong password is an error.
    async fn open(&self, workspace: &str, password: &str) -> VaultResult<Box<dyn VaultStore>>;
}

/// An open store.
#[async_trait]
pub trait VaultStore: Send {
    /// Read one secret.
    async fn get(&self, key: &str) -> VaultResult<Option<Zeroizing<String>>>;

    /// Write one secret durably.
    async fn set(&mut self, key: &str, value: &str) -> VaultResult<()>;

    /// Every secret.
    async fn all(&self) -> VaultResult<SecretMap>;

    /// Release the store.
    async fn close(self: Box<Self>) -> VaultResult<()>;
}
