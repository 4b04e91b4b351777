//! Subcommand handling for sandbox-broker.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::{AllowlistCommand, Commands};
use crate::config::{Config, ConfigLoader};
use crate::control::{MediationClient, SOCKET_ENV_VAR};
use crate::firewall::{Allowlist, FirewallController, ProxyAction, normalize};
use crate::kv::FileKv;
use crate::prompt::PopupPrompter;
use crate::runtime::{CliRuntime, ContainerRuntime};
use crate::session::{Collaborators, MediationSession};
use crate::vault::CommandVault;

/// How often `serve` checks whether the agent container is still running.
const CONTAINER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Run a subcommand.
pub fn handle_command(command: Commands, config: &Config, loader: &ConfigLoader) -> Result<()> {
    match command {
        Commands::Serve {
            container,
            workspace,
            allow_domains,
        } => block_on(serve(config, container, workspace, allow_domains)),
        Commands::Cleanup => block_on(cleanup(config)),
        Commands::Allowlist { action } => handle_allowlist(loader, action),
        Commands::InternalRequest { kind, payload } => {
            block_on(internal_request(kind, payload.as_deref()))
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    rt.block_on(future)
}

fn build_firewall(config: &Config, runtime: Arc<dyn ContainerRuntime>) -> Arc<FirewallController> {
    let allowlist = Arc::new(Allowlist::new(config.network.allowlist.iter().cloned()));
    Arc::new(FirewallController::new(
        runtime,
        config.firewall_settings(),
        allowlist,
    ))
}

async fn serve(
    config: &Config,
    container: String,
    workspace: String,
    allow_domains: Vec<String>,
) -> Result<()> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(CliRuntime::new(config.runtime_binary()));
    let firewall = build_firewall(config, Arc::clone(&runtime));

    let extra: Vec<String> = allow_domains
        .iter()
        .map(|d| normalize(d).with_context(|| format!("Invalid --allow-domain {d:?}")))
        .collect::<Result<_>>()?;

    let action = if extra.is_empty() {
        firewall.ensure_running().await
    } else {
        firewall.register_session_urls(&container, &extra).await
    }
    .context("Failed to start egress proxy")?;
    if action == ProxyAction::ReloadFailed {
        warn!("Proxy kept its previous configuration");
    }

    let (helper, helper_args) = config.vault_helper();
    let deps = Collaborators {
        firewall,
        vault: Arc::new(CommandVault::new(helper, helper_args)),
        kv: Arc::new(FileKv::new(config.kv_path())),
        prompter: Arc::new(PopupPrompter::new(Arc::clone(&runtime), container.clone())),
    };

    let mut session = MediationSession::new(container.clone(), workspace, deps)
        .context("Failed to create mediation session")?;
    let socket = session.start().context("Failed to start mediation server")?;
    println!("{}={}", SOCKET_ENV_VAR, socket.display());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
        () = wait_for_exit(runtime.as_ref(), &container) => {
            info!("Container {} stopped, shutting down", container);
        }
    }

    session.shutdown().await.context("Failed to stop mediation session")
}

/// Resolve once `container` is no longer running.
async fn wait_for_exit(runtime: &dyn ContainerRuntime, container: &str) {
    let mut interval = tokio::time::interval(CONTAINER_POLL_INTERVAL);
    loop {
        interval.tick().await;
        match runtime.is_running(container).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => debug!("Could not query {}: {}", container, e),
        }
    }
}

async fn cleanup(config: &Config) -> Result<()> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(CliRuntime::new(config.runtime_binary()));
    let firewall = build_firewall(config, runtime);

    if firewall
        .cleanup_if_unused()
        .await
        .context("Failed to clean up egress proxy")?
    {
        println!("Proxy stopped and session files removed.");
    } else {
        println!("Agent containers still running; nothing to clean up.");
    }
    Ok(())
}

fn handle_allowlist(loader: &ConfigLoader, action: AllowlistCommand) -> Result<()> {
    match action {
        AllowlistCommand::List => {
            let allowlist = loader.load_user_allowlist()?;
            for domain in allowlist.domains.allowed {
                println!("{domain}");
            }
        }
        AllowlistCommand::Add { domain } => {
            loader.save_to_allowlist(&domain)?;
            println!("Added {domain} to {}", loader.allowlist_path().display());
        }
        AllowlistCommand::Remove { domain } => {
            if !loader.remove_from_allowlist(&domain)? {
                anyhow::bail!("{domain} is not in the allowlist");
            }
            println!("Removed {domain}");
        }
        AllowlistCommand::Clear => {
            loader.clear_allowlist()?;
            println!("Cleared allowlist");
        }
    }
    Ok(())
}

async fn internal_request(kind: String, payload: Option<&str>) -> Result<()> {
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).context("Payload is not valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let client = MediationClient::from_env()?;
    let response = client
        .request(&kind, payload)
        .await
        .with_context(|| format!("Request to {} failed", client.socket_path().display()))?;

    println!("{}", serde_json::to_string(&response.payload)?);
    if let Some(error) = response.error_message() {
        anyhow::bail!("{error}");
    }
    Ok(())
}
