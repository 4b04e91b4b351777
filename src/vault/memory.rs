//! In-process vault backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use zeroize::Zeroizing;

use super::backend::{SecretMap, VaultBackend, VaultStore};
use super::error::{VaultError, VaultResult};

type Workspaces = Arc<Mutex<HashMap<String, SecretMap>>>;

/// Vault held in memory behind a single password.
///
/// Writes through any store are visible to later opens. Counts opens so
/// callers can observe unlock behaviour.
pub struct MemoryVault {
    password: Zeroizing<String>,
    workspaces: Workspaces,
    opens: AtomicUsize,
}

impl MemoryVault {
    /// Empty vault guarded by `password`.
    pub fn new(password: &str) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            workspaces: Arc::new(Mutex::new(HashMap::new())),
            opens: AtomicUsize::new(0),
        }
    }

    /// Seed one secret.
    pub fn with_secret(self, workspace: &str, key: &str, value: &str) -> Self {
        self.workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(workspace.to_string())
            .or_default()
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        self
    }

    /// Number of successful opens so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Current value of a secret, bypassing the password.
    pub fn peek(&self, workspace: &str, key: &str) -> Option<String> {
        self.workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workspace)
            .and_then(|w| w.get(key))
            .map(|v| v.as_str().to_owned())
    }
}

#[async_trait]
impl VaultBackend for MemoryVault {
    async fn open(&self, workspace: &str, password: &str) -> VaultResult<Box<dyn VaultStore>> {
        if password != self.password.as_str() {
            return Err(VaultError::Unlock("incorrect password".to_string()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStore {
            workspace: workspace.to_string(),
            workspaces: Arc::clone(&self.workspaces),
        }))
    }
}

struct MemoryStore {
    workspace: String,
    workspaces: Workspaces,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut SecretMap) -> T) -> T {
        let mut all = self
            .workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(all.entry(self.workspace.clone()).or_default())
    }
}

#[async_trait]
impl VaultStore for MemoryStore {
    async fn get(&self, key: &str) -> VaultResult<Option<Zeroizing<String>>> {
        Ok(self.with(|secrets| secrets.get(key).cloned()))
    }

    async fn set(&mut self, key: &str, value: &str) -> VaultResult<()> {
        self.with(|secrets| {
            secrets.insert(key.to_string(), Zeroizing::new(value.to_string()));
        });
        Ok(())
    }

    async fn all(&self) -> VaultResult<SecretMap> {
        Ok(self.with(|secrets| secrets.clone()))
    }

    async fn close(self: Box<Self>) -> VaultResult<()> {
        Ok(())
    }
}
