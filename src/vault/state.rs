//! Per-session vault cache.
//!
//! # Locking
//!
//! Two independent locks:
//!
//! - `store` (async) guards the decrypted secrets and the cached password.
//!   Handlers hold it across password prompts, which can take minutes.
//! - `retrieved` (sync) guards the value-to-key index read by the
//!   [`Redactor`](super::Redactor) on every terminal write. It is only held
//!   for an in-memory copy and never while `store` is awaited, so redaction
//!   cannot queue behind a pending prompt.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::MutexGuard;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::backend::SecretMap;

/// Decrypted store and unlock credential.
#[derive(Default)]
pub(crate) struct UnlockedVault {
    /// `None` until the first successful unlock.
    pub(crate) secrets: Option<SecretMap>,
    /// Kept so writes can re-open the backing store.
    pub(crate) password: Option<Zeroizing<String>>,
}

/// Vault state for one container run.
#[derive(Default)]
pub struct VaultState {
    store: tokio::sync::Mutex<UnlockedVault>,
    /// Secret value to key name, for every value handed out this session.
    retrieved: Mutex<HashMap<String, String>>,
}

impl VaultState {
    /// Fresh, locked state.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock_store(&self) -> MutexGuard<'_, UnlockedVault> {
        self.store.lock().await
    }

    /// Whether a successful unlock is cached.
    pub async fn is_unlocked(&self) -> bool {
        self.store.lock().await.secrets.is_some()
    }

    /// Record that `value` (the secret named `key`) left the broker.
    pub fn remember_retrieved(&self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        let mut retrieved = self
            .retrieved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A second copy of an indexed value would be dropped unzeroized.
        match retrieved.get_mut(value) {
            Some(existing) => key.clone_into(existing),
            None => {
                retrieved.insert(value.to_string(), key.to_string());
            }
        }
    }

    /// Copy of the retrieved-secrets index as `(value, key)` pairs.
    pub fn retrieved_snapshot(&self) -> Vec<(Zeroizing<String>, String)> {
        self.retrieved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(value, key)| (Zeroizing::new(value.clone()), key.clone()))
            .collect()
    }

    /// Zero and drop every secret, the password and the index.
    pub async fn clear(&self) {
        {
            let mut store = self.store.lock().await;
            store.secrets = None;
            store.password = None;
        }

        let mut retrieved = self
            .retrieved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (mut value, _key) in retrieved.drain() {
            value.zeroize();
        }
        debug!("Vault state cleared");
    }
}
