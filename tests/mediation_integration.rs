//! End-to-end tests over a real Unix socket, using only the public API.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sandbox_broker::control::protocol::{
    AllowDomainResponse, KvGetResponse, KvListResponse, VaultListResponse, VaultSetResponse,
};
use sandbox_broker::control::{
    ControlResult, Handler, MediationClient, MediationServer, Request, client,
};
use sandbox_broker::firewall::{Allowlist, FirewallController, FirewallSettings};
use sandbox_broker::kv::FileKv;
use sandbox_broker::prompt::{PromptRequest, PromptResult, Prompter, PromptError};
use sandbox_broker::runtime::{ContainerRuntime, ExecOutput, ProxySpec, RuntimeResult};
use sandbox_broker::session::{Collaborators, MediationSession};
use sandbox_broker::vault::MemoryVault;
use serde_json::{Value, json};
use tempfile::tempdir;
use zeroize::Zeroizing;

/// Runtime with no containers and no proxy.
#[derive(Default)]
struct IdleRuntime;

#[async_trait]
impl ContainerRuntime for IdleRuntime {
    async fn exec(&self, _container: &str, _argv: &[String]) -> RuntimeResult<ExecOutput> {
        Ok(ExecOutput::default())
    }
    async fn is_running(&self, _container: &str) -> RuntimeResult<bool> {
        Ok(false)
    }
    async fn network_exists(&self, _network: &str) -> RuntimeResult<bool> {
        Ok(true)
    }
    async fn create_network(&self, _network: &str, _internal: bool) -> RuntimeResult<()> {
        Ok(())
    }
    async fn network_subnet(&self, _network: &str) -> RuntimeResult<Option<String>> {
        Ok(Some("172.30.0.0/16".to_string()))
    }
    async fn run_proxy(&self, _spec: &ProxySpec) -> RuntimeResult<()> {
        Ok(())
    }
    async fn connect_network(&self, _network: &str, _container: &str) -> RuntimeResult<()> {
        Ok(())
    }
    async fn remove_container(&self, _container: &str) -> RuntimeResult<()> {
        Ok(())
    }
    async fn list_running_with_label(&self, _label: &str) -> RuntimeResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Answers every confirmation the same way and counts them.
struct FixedPrompter {
    approve: bool,
    password: &'static str,
    asked: Mutex<Vec<String>>,
}

impl FixedPrompter {
    fn new(approve: bool) -> Self {
        Self {
            approve,
            password: "hunter2",
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

#[async_trait]
impl Prompter for FixedPrompter {
    async fn confirm(&self, request: &PromptRequest) -> PromptResult<bool> {
        self.asked.lock().unwrap().push(request.title.clone());
        Ok(self.approve)
    }

    async fn password(&self, _request: &PromptRequest) -> PromptResult<Zeroizing<String>> {
        if self.approve {
            Ok(Zeroizing::new(self.password.to_string()))
        } else {
            Err(PromptError::Cancelled)
        }
    }
}

struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn handle(&self, payload: Value) -> ControlResult<Value> {
        Ok(payload)
    }
}

fn collaborators(dir: &Path, prompter: Arc<FixedPrompter>) -> Collaborators {
    let settings = FirewallSettings {
        state_dir: dir.join("firewall"),
        ..FirewallSettings::default()
    };
    Collaborators {
        firewall: Arc::new(FirewallController::new(
            Arc::new(IdleRuntime),
            settings,
            Arc::new(Allowlist::new(["pypi.org"])),
        )),
        vault: Arc::new(MemoryVault::new("hunter2").with_secret("ws", "API_TOKEN", "tok-123")),
        kv: Arc::new(FileKv::new(dir.join("kv.json"))),
        prompter,
    }
}

#[tokio::test]
async fn test_raw_server_round_trip() {
    let mut server = MediationServer::new().unwrap();
    server.handle("echo", Arc::new(Echo));
    server.start().unwrap();

    let request = Request {
        kind: "echo".to_string(),
        id: "abc".to_string(),
        payload: json!({"hello": "world"}),
    };
    let response = client::request(server.socket_path(), request).await.unwrap();
    assert_eq!(response.id, "abc");
    assert_eq!(response.payload, json!({"hello": "world"}));

    let unknown = MediationClient::new(server.socket_path())
        .request("nope", json!({}))
        .await
        .unwrap();
    assert_eq!(unknown.error_message(), Some("unknown message type: nope"));

    let socket = server.socket_path().to_path_buf();
    server.stop().await.unwrap();
    assert!(!socket.exists());
}

#[tokio::test]
async fn test_kv_through_session() {
    let dir = tempdir().unwrap();
    let prompter = Arc::new(FixedPrompter::new(false));
    let mut session =
        MediationSession::new("agent-kv", "ws", collaborators(dir.path(), prompter.clone()))
            .unwrap();
    let client = MediationClient::new(session.start().unwrap());

    for (key, value) in [("build/a", "1"), ("build/b", "2"), ("other", "3")] {
        client
            .request("kv_set", json!({"key": key, "value": value}))
            .await
            .unwrap();
    }
    let listed: KvListResponse = client
        .request("kv_list", json!({"prefix": "build/"}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    assert_eq!(listed.entries.len(), 2);

    client
        .request("kv_delete", json!({"key": "other"}))
        .await
        .unwrap();
    let gone: KvGetResponse = client
        .request("kv_get", json!({"key": "other"}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    assert!(!gone.found);
    assert_eq!(prompter.asked(), 0);

    session.shutdown().await.unwrap();
    assert!(dir.path().join("kv.json").exists());
}

#[tokio::test]
async fn test_denied_requests() {
    let dir = tempdir().unwrap();
    let prompter = Arc::new(FixedPrompter::new(false));
    let mut session =
        MediationSession::new("agent-deny", "ws", collaborators(dir.path(), prompter.clone()))
            .unwrap();
    let client = MediationClient::new(session.start().unwrap());

    let domain: AllowDomainResponse = client
        .request("allow_domain", json!({"domain": "evil.example"}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    assert!(!domain.approved);

    let keys: VaultListResponse = client
        .request("vault_list", json!({}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    assert!(!keys.approved);
    assert!(keys.keys.is_none());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_vault_set_and_list() {
    let dir = tempdir().unwrap();
    let prompter = Arc::new(FixedPrompter::new(true));
    let deps = collaborators(dir.path(), prompter.clone());
    let mut session = MediationSession::new("agent-vault", "ws", deps).unwrap();
    let client = MediationClient::new(session.start().unwrap());

    let set: VaultSetResponse = client
        .request("vault_set", json!({"key": "NEW_KEY", "value": "fresh"}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    assert!(set.approved, "{:?}", set.error);

    let keys: VaultListResponse = client
        .request("vault_list", json!({}))
        .await
        .unwrap()
        .payload_as()
        .unwrap();
    let mut keys = keys.keys.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["API_TOKEN", "NEW_KEY"]);

    let invalid = client
        .request("vault_set", json!({"key": "bad key", "value": "x"}))
        .await
        .unwrap();
    assert!(invalid.error_message().is_some());

    session.shutdown().await.unwrap();
}
