//! Container runtime abstraction.
//!
//! The broker never links against a container engine. Everything it needs
//! (running a command inside the agent container, managing the proxy
//! container and its networks) goes through [`ContainerRuntime`], which the
//! production [`CliRuntime`] implements by shelling out to a
//! docker-compatible CLI.

mod cli;
mod error;
#[cfg(test)]
pub(crate) mod testing;

pub use cli::CliRuntime;
pub use error::{RuntimeError, RuntimeResult};

use async_trait::async_trait;
use std::path::PathBuf;

/// Captured result of a command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit status code (`-1` if terminated by signal).
    pub status: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// How to launch the egress proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Network the proxy is attached to at creation (the internal one).
    pub network: String,
    /// Host path of the generated configuration.
    pub config_path: PathBuf,
    /// Path the configuration is mounted at inside the container.
    pub config_mount: String,
}

/// Operations the broker needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run `argv` inside a running container and capture its output.
    ///
    /// A non-zero exit is not an error; callers inspect [`ExecOutput`].
    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput>;

    /// Whether a container with this name is running.
    async fn is_running(&self, container: &str) -> RuntimeResult<bool>;

    /// Whether a network with this name exists.
    async fn network_exists(&self, network: &str) -> RuntimeResult<bool>;

    /// Create a network. `internal` networks have no route to the outside.
    async fn create_network(&self, network: &str, internal: bool) -> RuntimeResult<()>;

    /// The CIDR address range of a network, if it has one.
    async fn network_subnet(&self, network: &str) -> RuntimeResult<Option<String>>;

    /// Start the proxy container detached.
    async fn run_proxy(&self, spec: &ProxySpec) -> RuntimeResult<()>;

    /// Attach a running container to an additional network.
    async fn connect_network(&self, network: &str, container: &str) -> RuntimeResult<()>;

    /// Force-remove a container. Missing container is not an error.
    async fn remove_container(&self, container: &str) -> RuntimeResult<()>;

    /// Names of running containers carrying `label`.
    async fn list_running_with_label(&self, label: &str) -> RuntimeResult<Vec<String>>;
}
