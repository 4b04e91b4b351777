//! Egress proxy lifecycle and dynamic reconfiguration.
//!
//! # Topology
//!
//! ```text
//!  ┌────────────┐  internal network   ┌─────────┐  egress network
//!  │ agent(s)   │────────────────────>│  proxy  │────────────────> internet
//!  └────────────┘  (no outside route) └─────────┘
//! ```
//!
//! Agents only sit on the internal network, so the proxy is their sole path
//! out. The proxy configuration is regenerated in full from the allowlist
//! plus every session file whenever anything changes, then applied with an
//! in-place reload so established sessions are not dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::allowlist::Allowlist;
use super::config::{DEFAULT_PROXY_PORT, GeneratedConfig, ProxyConfigGenerator};
use super::error::{FirewallError, FirewallResult};
use super::normalize::normalize;
use super::registry::{SessionRegistry, write_atomic};
use crate::runtime::{ContainerRuntime, ProxySpec};
use crate::telemetry::{self, AuditEvent};

/// Generated configuration file name inside the state directory.
pub const PROXY_CONFIG_FILE: &str = "squid.conf";

/// Session file directory name inside the state directory.
pub const SESSIONS_DIR: &str = "sessions";

/// Static settings for the firewall.
#[derive(Debug, Clone)]
pub struct FirewallSettings {
    /// Name of the proxy container.
    pub proxy_container: String,
    /// Proxy image reference.
    pub proxy_image: String,
    /// Network shared by agents and the proxy (no outside route).
    pub internal_network: String,
    /// Network giving the proxy its route out.
    pub egress_network: String,
    /// Label carried by every agent container.
    pub agent_label: String,
    /// Port the proxy listens on.
    pub proxy_port: u16,
    /// Where the generated config and session files live on the host.
    pub state_dir: PathBuf,
    /// Path the config is mounted at inside the proxy container.
    pub config_mount: String,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        let state_dir = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("sandbox-broker")
            .join("firewall");

        Self {
            proxy_container: "sandbox-broker-proxy".to_string(),
            proxy_image: "ubuntu/squid:latest".to_string(),
            internal_network: "sandbox-broker-internal".to_string(),
            egress_network: "sandbox-broker-egress".to_string(),
            agent_label: "sandbox-broker.agent".to_string(),
            proxy_port: DEFAULT_PROXY_PORT,
            state_dir,
            config_mount: "/etc/squid/squid.conf".to_string(),
        }
    }
}

/// What applying a configuration did to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAction {
    /// The proxy was not running and has been started.
    Started,
    /// The running proxy accepted the new configuration.
    Reloaded,
    /// The running proxy rejected or missed the reload; it keeps its
    /// previous configuration.
    ReloadFailed,
}

/// Ensures the proxy runs and keeps its configuration current.
pub struct FirewallController {
    runtime: Arc<dyn ContainerRuntime>,
    settings: FirewallSettings,
    allowlist: Arc<Allowlist>,
    registry: SessionRegistry,
    /// Serializes regenerate-and-reload cycles.
    apply_lock: Mutex<()>,
}

impl FirewallController {
    /// Create a controller.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        settings: FirewallSettings,
        allowlist: Arc<Allowlist>,
    ) -> Self {
        let registry = SessionRegistry::new(settings.state_dir.join(SESSIONS_DIR));
        Self {
            runtime,
            settings,
            allowlist,
            registry,
            apply_lock: Mutex::new(()),
        }
    }

    /// The session URL registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Firewall settings.
    pub fn settings(&self) -> &FirewallSettings {
        &self.settings
    }

    /// Host path of the generated proxy configuration.
    pub fn config_path(&self) -> PathBuf {
        self.settings.state_dir.join(PROXY_CONFIG_FILE)
    }

    /// Create the internal and egress networks if missing.
    pub async fn ensure_networks(&self) -> FirewallResult<()> {
        for (network, internal) in [
            (&self.settings.internal_network, true),
            (&self.settings.egress_network, false),
        ] {
            if self.runtime.network_exists(network).await? {
                debug!("Network {} already exists", network);
                continue;
            }
            info!("Creating network {} (internal: {})", network, internal);
            self.runtime.create_network(network, internal).await?;
        }
        Ok(())
    }

    /// Start the proxy, or push the current configuration into the running
    /// one. A failed reload is logged and reported as
    /// [`ProxyAction::ReloadFailed`].
    pub async fn ensure_running(&self) -> FirewallResult<ProxyAction> {
        self.apply(false).await
    }

    /// Persist a container's extra domains and apply the new aggregate.
    pub async fn register_session_urls(
        &self,
        container: &str,
        urls: &[String],
    ) -> FirewallResult<ProxyAction> {
        let (name, owned_urls) = (container.to_string(), urls.to_vec());
        self.on_registry(move |registry| registry.register(&name, &owned_urls))
            .await?;
        info!("Registered {} session URL(s) for {}", urls.len(), container);
        self.apply(false).await
    }

    /// Drop a container's extra domains and apply what remains.
    ///
    /// Returns `None` when the proxy is not running; the next start picks up
    /// the reduced set anyway.
    pub async fn remove_session_urls(&self, container: &str) -> FirewallResult<Option<ProxyAction>> {
        let name = container.to_string();
        self.on_registry(move |registry| registry.remove(&name))
            .await?;
        if !self.runtime.is_running(&self.settings.proxy_container).await? {
            debug!("Proxy not running, skipping reload after removing {}", container);
            return Ok(None);
        }
        self.apply(false).await.map(Some)
    }

    /// Grant `domain` to `container` for the rest of its session.
    ///
    /// The grant lives only in the container's session file, so
    /// [`remove_session_urls`](Self::remove_session_urls) revokes it.
    /// Returns the normalized entry. Unlike [`register_session_urls`], a
    /// failed reload is an error here: the caller is answering a human who
    /// was just told the domain is reachable.
    ///
    /// [`register_session_urls`]: Self::register_session_urls
    pub async fn allow_domain(&self, container: &str, domain: &str) -> FirewallResult<String> {
        let entry = normalize(domain)?;
        let (name, added) = (container.to_string(), entry.clone());
        self.on_registry(move |registry| registry.add(&name, &added))
            .await?;
        self.apply(true).await?;
        info!("Allowed {} for {}", entry, container);
        Ok(entry)
    }

    /// Stop the proxy and delete all session files when no agent container
    /// is running. Returns whether cleanup happened.
    pub async fn cleanup_if_unused(&self) -> FirewallResult<bool> {
        let running = self
            .runtime
            .list_running_with_label(&self.settings.agent_label)
            .await?;
        if !running.is_empty() {
            debug!("{} agent container(s) still running, keeping proxy", running.len());
            return Ok(false);
        }

        info!("No agent containers running, stopping proxy");
        self.runtime
            .remove_container(&self.settings.proxy_container)
            .await?;
        self.on_registry(|registry| registry.clear_all()).await?;
        Ok(true)
    }

    /// Render the configuration for the current allowlist and registry.
    pub async fn generate(&self) -> FirewallResult<GeneratedConfig> {
        let subnet = self
            .runtime
            .network_subnet(&self.settings.internal_network)
            .await?
            .ok_or_else(|| FirewallError::UnknownSubnet(self.settings.internal_network.clone()))?;

        let generator = ProxyConfigGenerator::new(subnet, self.settings.proxy_port);
        let session = self.on_registry(|registry| registry.aggregate()).await?;
        Ok(generator.generate(self.allowlist.domains(), session))
    }

    async fn apply(&self, strict: bool) -> FirewallResult<ProxyAction> {
        let _guard = self.apply_lock.lock().await;

        self.ensure_networks().await?;
        let config = self.generate().await?;
        if config.is_block_all() {
            warn!("No allowed domains; proxy will block all destinations");
        }
        let (path, text) = (self.config_path(), config.text.clone());
        self.on_registry(move |_| write_config(&path, &text))
            .await?;

        if !self.runtime.is_running(&self.settings.proxy_container).await? {
            self.start_proxy().await?;
            return Ok(ProxyAction::Started);
        }

        match self.reload().await {
            Ok(()) => {
                telemetry::record(AuditEvent::ProxyReload {
                    domains: config.domains.len(),
                    success: true,
                });
                Ok(ProxyAction::Reloaded)
            }
            Err(e) => {
                telemetry::record(AuditEvent::ProxyReload {
                    domains: config.domains.len(),
                    success: false,
                });
                if strict {
                    return Err(e);
                }
                warn!("Proxy reload failed, keeping last configuration: {}", e);
                Ok(ProxyAction::ReloadFailed)
            }
        }
    }

    /// Run blocking state-file IO on the blocking pool.
    async fn on_registry<T, F>(&self, op: F) -> FirewallResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SessionRegistry) -> FirewallResult<T> + Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || op(&registry)).await?
    }

    async fn start_proxy(&self) -> FirewallResult<()> {
        let spec = ProxySpec {
            name: self.settings.proxy_container.clone(),
            image: self.settings.proxy_image.clone(),
            network: self.settings.internal_network.clone(),
            config_path: self.config_path(),
            config_mount: self.settings.config_mount.clone(),
        };

        // A stopped container with the same name blocks `run`.
        self.runtime.remove_container(&spec.name).await?;
        info!("Starting proxy {} ({})", spec.name, spec.image);
        self.runtime.run_proxy(&spec).await?;
        self.runtime
            .connect_network(&self.settings.egress_network, &spec.name)
            .await?;
        Ok(())
    }

    async fn reload(&self) -> FirewallResult<()> {
        let argv = vec!["squid".to_string(), "-k".to_string(), "reconfigure".to_string()];
        let output = self
            .runtime
            .exec(&self.settings.proxy_container, &argv)
            .await?;
        if !output.success() {
            return Err(FirewallError::Runtime(crate::runtime::RuntimeError::CommandError {
                cmd: "squid -k reconfigure".to_string(),
                stderr: output.stderr.trim().to_string(),
            }));
        }
        debug!("Proxy reloaded");
        Ok(())
    }
}

fn write_config(path: &Path, text: &str) -> FirewallResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FirewallError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    write_atomic(path, text.as_bytes())?;
    debug!("Wrote proxy configuration to {:?}", path);
    Ok(())
}
