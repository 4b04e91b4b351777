//! One mediation session per agent container.
//!
//! ```text
//! MediationSession::new ──> start() ──────────────> shutdown()
//!   registers handlers        socket path to         stop server
//!   (8 message types)         the container env      zero vault state
//!                                                    drop session URLs
//!                                                    stop proxy if unused
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::control::{ControlError, MediationServer, MessageType};
use crate::firewall::{
    AllowDomainHandler, FirewallController, FirewallError, validate_container_name,
};
use crate::kv::{KvBackend, KvDeleteHandler, KvGetHandler, KvListHandler, KvService, KvSetHandler};
use crate::prompt::Prompter;
use crate::telemetry::{self, AuditEvent};
use crate::vault::{
    Redactor, VaultBackend, VaultGetHandler, VaultListHandler, VaultService, VaultSetHandler,
    VaultState,
};

/// Errors from session setup and teardown.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Channel failure.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Invalid container name.
    #[error(transparent)]
    Firewall(#[from] FirewallError),
}

/// Collaborators shared by every handler of a session.
#[derive(Clone)]
pub struct Collaborators {
    /// Shared egress firewall.
    pub firewall: Arc<FirewallController>,
    /// Vault backing store.
    pub vault: Arc<dyn VaultBackend>,
    /// Scratch store.
    pub kv: Arc<dyn KvBackend>,
    /// Human approval.
    pub prompter: Arc<dyn Prompter>,
}

/// Server, vault state and handlers for one container run.
pub struct MediationSession {
    container: String,
    workspace: String,
    server: MediationServer,
    vault_state: Arc<VaultState>,
    firewall: Arc<FirewallController>,
    started_at: Option<Instant>,
}

impl MediationSession {
    /// Bind a socket and register every handler for `container`.
    pub fn new(
        container: impl Into<String>,
        workspace: impl Into<String>,
        deps: Collaborators,
    ) -> Result<Self, SessionError> {
        let container = container.into();
        let workspace = workspace.into();
        validate_container_name(&container)?;

        let server = MediationServer::new()?;
        let vault_state = Arc::new(VaultState::new());

        server.handle(
            MessageType::AllowDomain.as_str(),
            Arc::new(AllowDomainHandler::new(
                container.clone(),
                Arc::clone(&deps.firewall),
                Arc::clone(&deps.prompter),
            )),
        );

        let vault = Arc::new(VaultService::new(
            container.clone(),
            workspace.clone(),
            Arc::clone(&vault_state),
            deps.vault,
            deps.prompter,
        ));
        server.handle(
            MessageType::VaultGet.as_str(),
            Arc::new(VaultGetHandler(Arc::clone(&vault))),
        );
        server.handle(
            MessageType::VaultList.as_str(),
            Arc::new(VaultListHandler(Arc::clone(&vault))),
        );
        server.handle(MessageType::VaultSet.as_str(), Arc::new(VaultSetHandler(vault)));

        let kv = Arc::new(KvService::new(deps.kv));
        server.handle(MessageType::KvGet.as_str(), Arc::new(KvGetHandler(Arc::clone(&kv))));
        server.handle(MessageType::KvSet.as_str(), Arc::new(KvSetHandler(Arc::clone(&kv))));
        server.handle(
            MessageType::KvDelete.as_str(),
            Arc::new(KvDeleteHandler(Arc::clone(&kv))),
        );
        server.handle(MessageType::KvList.as_str(), Arc::new(KvListHandler(kv)));

        Ok(Self {
            container,
            workspace,
            server,
            vault_state,
            firewall: deps.firewall,
            started_at: None,
        })
    }

    /// Container this session serves.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Socket to expose to the container.
    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    /// Redactor over secrets handed out this session.
    ///
    /// The broker never relays the container's terminal itself. An embedder
    /// that does (a tmux pipe-pane reader, a PTY wrapper, a log shipper)
    /// passes that output through this before showing or storing it. The
    /// redactor stays valid after [`shutdown`](Self::shutdown) but then
    /// matches nothing.
    pub fn redactor(&self) -> Redactor {
        Redactor::new(Arc::clone(&self.vault_state))
    }

    /// Start serving. Returns the socket path.
    pub fn start(&mut self) -> Result<PathBuf, SessionError> {
        self.server.start()?;
        self.started_at = Some(Instant::now());

        telemetry::record(AuditEvent::SessionStart {
            container: self.container.clone(),
            workspace: self.workspace.clone(),
            pid: std::process::id(),
        });
        info!("Mediation session started for {}", self.container);
        Ok(self.socket_path().to_path_buf())
    }

    /// Stop serving and release everything the session held.
    ///
    /// Firewall cleanup failures are logged, not returned.
    pub async fn shutdown(mut self) -> Result<(), SessionError> {
        let stopped = self.server.stop().await;
        self.vault_state.clear().await;

        if let Err(e) = self.firewall.remove_session_urls(&self.container).await {
            warn!("Failed to remove session URLs for {}: {}", self.container, e);
        }
        match self.firewall.cleanup_if_unused().await {
            Ok(true) => info!("Proxy stopped, no agents left"),
            Ok(false) => {}
            Err(e) => warn!("Proxy cleanup failed: {}", e),
        }

        let duration_sec = self
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or_default();
        telemetry::record(AuditEvent::SessionEnd {
            container: self.container.clone(),
            duration_sec,
        });
        info!(
            "Mediation session for {} ended after {}s",
            self.container, duration_sec
        );

        stopped.map_err(SessionError::from)
    }
}
