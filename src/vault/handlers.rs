//! `vault_get`, `vault_list` and `vault_set` handlers.
//!
//! Every operation asks the human first, then unlocks if needed. Reads and
//! writes are approved separately. Unlock failures are never cached.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::backend::{SecretMap, VaultBackend};
use super::error::{VaultError, VaultResult};
use super::state::{UnlockedVault, VaultState};
use crate::control::{
    ControlResult, Handler, decode_payload, encode_payload,
    protocol::{
        VaultGetRequest, VaultGetResponse, VaultListRequest, VaultListResponse, VaultSetRequest,
        VaultSetResponse,
    },
};
use crate::prompt::{PromptRequest, Prompter};
use crate::telemetry::{self, AuditEvent, Decision};

/// Shared logic behind the three vault handlers.
pub struct VaultService {
    container: String,
    workspace: String,
    state: Arc<VaultState>,
    backend: Arc<dyn VaultBackend>,
    prompter: Arc<dyn Prompter>,
}

impl VaultService {
    /// Service for `container` using `workspace`'s vault.
    pub fn new(
        container: impl Into<String>,
        workspace: impl Into<String>,
        state: Arc<VaultState>,
        backend: Arc<dyn VaultBackend>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            container: container.into(),
            workspace: workspace.into(),
            state,
            backend,
            prompter,
        }
    }

    /// Session state shared with the redactor.
    pub fn state(&self) -> &Arc<VaultState> {
        &self.state
    }

    /// Return the cached store, prompting for the password on first use.
    async fn ensure_unlocked(&self, guard: &mut UnlockedVault) -> VaultResult<()> {
        if guard.secrets.is_some() {
            return Ok(());
        }

        let password = self
            .prompter
            .password(&PromptRequest::vault_unlock(&self.workspace))
            .await?;

        let opened = self.load(&password).await;
        telemetry::record(AuditEvent::VaultUnlock {
            container: self.container.clone(),
            success: opened.is_ok(),
        });

        let secrets = opened?;
        info!(
            "Vault for workspace {} unlocked ({} secrets)",
            self.workspace,
            secrets.len()
        );
        guard.secrets = Some(secrets);
        guard.password = Some(password);
        Ok(())
    }

    async fn load(&self, password: &str) -> VaultResult<SecretMap> {
        let store = self.backend.open(&self.workspace, password).await?;
        let secrets = store.all().await;
        store.close().await?;
        secrets
    }

    async fn confirm(&self, request: PromptRequest) -> VaultResult<bool> {
        Ok(self.prompter.confirm(&request).await?)
    }

    /// Read one secret after approval.
    pub async fn get(&self, request: VaultGetRequest) -> VaultGetResponse {
        let key = request.key;
        if key.is_empty() {
            return get_error(false, VaultError::MissingKey);
        }

        let approved = match self.confirm(PromptRequest::vault_read(&key)).await {
            Ok(approved) => approved,
            Err(e) => return get_error(false, e),
        };
        telemetry::record(AuditEvent::SecretRead {
            container: self.container.clone(),
            key: key.clone(),
            decision: Decision::from(approved),
        });
        if !approved {
            return VaultGetResponse::default();
        }

        let mut guard = self.state.lock_store().await;
        if let Err(e) = self.ensure_unlocked(&mut guard).await {
            return get_error(true, e);
        }

        let value = guard
            .secrets
            .as_ref()
            .and_then(|secrets| secrets.get(&key))
            .map(|v| v.as_str().to_owned());
        drop(guard);

        match value {
            Some(value) => {
                self.state.remember_retrieved(&key, &value);
                VaultGetResponse {
                    value: Some(value),
                    approved: true,
                    error: None,
                }
            }
            None => get_error(true, VaultError::NotFound(key)),
        }
    }

    /// List secret names after approval.
    pub async fn list(&self, _request: VaultListRequest) -> VaultListResponse {
        let approved = match self.confirm(PromptRequest::vault_list()).await {
            Ok(approved) => approved,
            Err(e) => {
                return VaultListResponse {
                    keys: None,
                    approved: false,
                    error: Some(e.to_string()),
                };
            }
        };
        telemetry::record(AuditEvent::SecretList {
            container: self.container.clone(),
            decision: Decision::from(approved),
        });
        if !approved {
            return VaultListResponse::default();
        }

        let mut guard = self.state.lock_store().await;
        if let Err(e) = self.ensure_unlocked(&mut guard).await {
            return VaultListResponse {
                keys: None,
                approved: true,
                error: Some(e.to_string()),
            };
        }

        let mut keys: Vec<String> = guard
            .secrets
            .as_ref()
            .map(|secrets| secrets.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();

        VaultListResponse {
            keys: Some(keys),
            approved: true,
            error: None,
        }
    }

    /// Write one secret after approval.
    pub async fn set(&self, request: VaultSetRequest) -> VaultSetResponse {
        let key = request.key;
        let value = Zeroizing::new(request.value);

        if let Err(e) = validate_key(&key) {
            return set_error(false, e);
        }
        if value.is_empty() {
            return set_error(false, VaultError::EmptyValue);
        }

        let approved = match self.confirm(PromptRequest::vault_write(&key)).await {
            Ok(approved) => approved,
            Err(e) => return set_error(false, e),
        };
        telemetry::record(AuditEvent::SecretWrite {
            container: self.container.clone(),
            key: key.clone(),
            decision: Decision::from(approved),
        });
        if !approved {
            return VaultSetResponse::default();
        }

        let mut guard = self.state.lock_store().await;
        if let Err(e) = self.ensure_unlocked(&mut guard).await {
            return set_error(true, e);
        }

        if let Err(e) = self.persist(&guard, &key, &value).await {
            warn!("Failed to write secret {}: {}", key, e);
            return set_error(true, e);
        }

        if let Some(secrets) = guard.secrets.as_mut() {
            secrets.insert(key.clone(), Zeroizing::new(value.as_str().to_owned()));
        }
        info!("Stored secret {} in workspace {}", key, self.workspace);

        VaultSetResponse {
            approved: true,
            error: None,
        }
    }

    async fn persist(&self, guard: &UnlockedVault, key: &str, value: &str) -> VaultResult<()> {
        let password = guard.password.as_ref().ok_or(VaultError::Locked)?;
        let mut store = self.backend.open(&self.workspace, password).await?;
        let written = store.set(key, value).await;
        store.close().await?;
        written
    }
}

/// Keys share one flat namespace with environment-style names.
fn validate_key(key: &str) -> VaultResult<()> {
    if key.is_empty() {
        return Err(VaultError::MissingKey);
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VaultError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn get_error(approved: bool, error: impl ToString) -> VaultGetResponse {
    VaultGetResponse {
        value: None,
        approved,
        error: Some(error.to_string()),
    }
}

fn set_error(approved: bool, error: impl ToString) -> VaultSetResponse {
    VaultSetResponse {
        approved,
        error: Some(error.to_string()),
    }
}

/// `vault_get` handler.
pub struct VaultGetHandler(pub Arc<VaultService>);

/// `vault_list` handler.
pub struct VaultListHandler(pub Arc<VaultService>);

/// `vault_set` handler.
pub struct VaultSetHandler(pub Arc<VaultService>);

#[async_trait]
impl Handler for VaultGetHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.get(decode_payload(payload)?).await)
    }
}

#[async_trait]
impl Handler for VaultListHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.list(decode_payload(payload)?).await)
    }
}

#[async_trait]
impl Handler for VaultSetHandler {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        encode_payload(&self.0.set(decode_payload(payload)?).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptKind;
    use crate::prompt::testing::ScriptedPrompter;
    use crate::vault::MemoryVault;

    const WS: &str = "ws";

    struct Fixture {
        vault: Arc<MemoryVault>,
        prompter: Arc<ScriptedPrompter>,
        service: VaultService,
    }

    fn fixture(vault: MemoryVault) -> Fixture {
        let vault = Arc::new(vault);
        let prompter = Arc::new(ScriptedPrompter::approving());
        let service = VaultService::new(
            "agent-1",
            WS,
            Arc::new(VaultState::new()),
            vault.clone(),
            prompter.clone(),
        );
        Fixture {
            vault,
            prompter,
            service,
        }
    }

    fn get(key: &str) -> VaultGetRequest {
        VaultGetRequest {
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_get_unlocks_once() {
        let f = fixture(MemoryVault::new("pw").with_secret(WS, "TOKEN", "t0k3n"));
        f.prompter.push_password(Some("pw"));

        let first = f.service.get(get("TOKEN")).await;
        assert!(first.approved);
        assert_eq!(first.value.as_deref(), Some("t0k3n"));
        assert_eq!(f.prompter.count(PromptKind::VaultUnlock), 1);
        assert_eq!(f.vault.opens(), 1);

        let second = f.service.get(get("TOKEN")).await;
        assert_eq!(second.value.as_deref(), Some("t0k3n"));
        assert_eq!(f.prompter.count(PromptKind::VaultUnlock), 1);
        assert_eq!(f.vault.opens(), 1);
        assert_eq!(f.prompter.count(PromptKind::VaultRead), 2);
    }

    #[tokio::test]
    async fn test_retrieved_value_is_indexed_for_redaction() {
        let f = fixture(MemoryVault::new("pw").with_secret(WS, "TOKEN", "t0k3n"));
        f.prompter.push_password(Some("pw"));

        f.service.get(get("TOKEN")).await;

        let index = f.service.state().retrieved_snapshot();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].0.as_str(), "t0k3n");
        assert_eq!(index[0].1, "TOKEN");
    }

    #[tokio::test]
    async fn test_missing_key_is_approved_not_found() {
        let f = fixture(MemoryVault::new("pw"));
        f.prompter.push_password(Some("pw"));

        let resp = f.service.get(get("ABSENT")).await;
        assert!(resp.approved);
        assert_eq!(resp.value, None);
        assert!(resp.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_denied_get_never_unlocks() {
        let f = fixture(MemoryVault::new("pw").with_secret(WS, "TOKEN", "t"));
        f.prompter.set_approve(false);

        let resp = f.service.get(get("TOKEN")).await;
        assert!(!resp.approved);
        assert_eq!(resp.error, None);
        assert_eq!(resp.value, None);
        assert_eq!(f.prompter.count(PromptKind::VaultUnlock), 0);
        assert!(f.service.state().retrieved_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_rejected_without_prompt() {
        let f = fixture(MemoryVault::new("pw"));
        let resp = f.service.get(get("")).await;
        assert!(!resp.approved);
        assert!(resp.error.is_some());
        assert!(f.prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_failed_unlock_is_not_cached() {
        let f = fixture(MemoryVault::new("pw").with_secret(WS, "TOKEN", "t"));
        f.prompter.push_password(Some("wrong"));
        f.prompter.push_password(Some("pw"));

        let first = f.service.get(get("TOKEN")).await;
        assert!(first.approved);
        assert!(first.error.unwrap().contains("unlock failed"));
        assert!(!f.service.state().is_unlocked().await);

        let second = f.service.get(get("TOKEN")).await;
        assert_eq!(second.value.as_deref(), Some("t"));
        assert_eq!(f.prompter.count(PromptKind::VaultUnlock), 2);
    }

    #[tokio::test]
    async fn test_cancelled_password_is_error() {
        let f = fixture(MemoryVault::new("pw"));
        f.prompter.push_password(None);

        let resp = f.service.get(get("TOKEN")).await;
        assert!(resp.approved);
        assert_eq!(resp.error.as_deref(), Some("prompt cancelled"));
    }

    #[tokio::test]
    async fn test_set_then_get_without_new_unlock() {
        let f = fixture(MemoryVault::new("pw"));
        f.prompter.push_password(Some("pw"));

        let resp = f
            .service
            .set(VaultSetRequest {
                key: "NEW_KEY".to_string(),
                value: "v".to_string(),
            })
            .await;
        assert!(resp.approved);
        assert_eq!(resp.error, None);
        assert_eq!(f.vault.peek(WS, "NEW_KEY").as_deref(), Some("v"));

        let got = f.service.get(get("NEW_KEY")).await;
        assert!(got.approved);
        assert_eq!(got.value.as_deref(), Some("v"));
        assert_eq!(f.prompter.count(PromptKind::VaultUnlock), 1);
        assert_eq!(f.prompter.count(PromptKind::VaultRead), 1);
        assert_eq!(f.prompter.count(PromptKind::VaultWrite), 1);
    }

    #[tokio::test]
    async fn test_set_validates_before_prompting() {
        let f = fixture(MemoryVault::new("pw"));

        for (key, value) in [("BAD-KEY", "v"), ("../etc", "v"), ("", "v"), ("OK", "")] {
            let resp = f
                .service
                .set(VaultSetRequest {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .await;
            assert!(!resp.approved);
            assert!(resp.error.is_some(), "{key:?} accepted");
        }
        assert!(f.prompter.asked().is_empty());
    }

    #[tokio::test]
    async fn test_list_returns_sorted_names() {
        let f = fixture(
            MemoryVault::new("pw")
                .with_secret(WS, "B", "2")
                .with_secret(WS, "A", "1"),
        );
        f.prompter.push_password(Some("pw"));

        let resp = f.service.list(VaultListRequest {}).await;
        assert!(resp.approved);
        assert_eq!(resp.keys, Some(vec!["A".to_string(), "B".to_string()]));
        assert!(f.service.state().retrieved_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_list_denied() {
        let f = fixture(MemoryVault::new("pw"));
        f.prompter.set_approve(false);

        let resp = f.service.list(VaultListRequest {}).await;
        assert!(!resp.approved);
        assert_eq!(resp.keys, None);
    }
}
