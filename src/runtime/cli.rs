//! Docker-compatible CLI implementation of [`ContainerRuntime`].
//!
//! Works with `docker` and `podman`, which share the subset of commands
//! used here.

use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use super::{ContainerRuntime, ExecOutput, ProxySpec, RuntimeError, RuntimeResult};

/// Label put on the proxy container so it is recognisable in `ps` output.
pub const PROXY_LABEL: &str = "sandbox-broker.role=proxy";

/// Container runtime driven through its command-line client.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    binary: String,
}

impl CliRuntime {
    /// Use the given runtime binary (`docker`, `podman`, or a path).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// The runtime binary in use.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn output(&self, args: &[String]) -> RuntimeResult<Output> {
        let cmd_str = format!("{} {}", self.binary, args.join(" "));
        debug!("Running: {}", cmd_str);

        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RuntimeError::CommandFailed {
                cmd: cmd_str,
                source: e,
            })
    }

    /// Run a command and require success, returning trimmed stdout.
    async fn run(&self, args: &[String]) -> RuntimeResult<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(RuntimeError::CommandError {
                cmd: format!("{} {}", self.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        let mut args = vec!["exec".to_string(), container.to_string()];
        args.extend(argv.iter().cloned());

        let output = self.output(&args).await?;
        Ok(ExecOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn is_running(&self, container: &str) -> RuntimeResult<bool> {
        let args = strings(&["inspect", "-f", "{{.State.Running}}", container]);
        match self.run(&args).await {
            Ok(state) => Ok(state == "true"),
            Err(RuntimeError::CommandError { stderr, .. }) if is_not_found(&stderr) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn network_exists(&self, network: &str) -> RuntimeResult<bool> {
        let args = strings(&["network", "inspect", network]);
        match self.run(&args).await {
            Ok(_) => Ok(true),
            Err(RuntimeError::CommandError { stderr, .. }) if is_not_found(&stderr) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_network(&self, network: &str, internal: bool) -> RuntimeResult<()> {
        self.run(&network_create_args(network, internal)).await?;
        Ok(())
    }

    async fn network_subnet(&self, network: &str) -> RuntimeResult<Option<String>> {
        let args = strings(&[
            "network",
            "inspect",
            "-f",
            "{{range .IPAM.Config}}{{.Subnet}} {{end}}",
            network,
        ]);
        let out = self.run(&args).await?;
        Ok(parse_subnet(&out))
    }

    async fn run_proxy(&self, spec: &ProxySpec) -> RuntimeResult<()> {
        self.run(&proxy_run_args(spec)).await?;
        Ok(())
    }

    async fn connect_network(&self, network: &str, container: &str) -> RuntimeResult<()> {
        self.run(&strings(&["network", "connect", network, container]))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, container: &str) -> RuntimeResult<()> {
        match self.run(&strings(&["rm", "-f", container])).await {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandError { stderr, .. }) if is_not_found(&stderr) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_running_with_label(&self, label: &str) -> RuntimeResult<Vec<String>> {
        let filter = format!("label={label}");
        let args = strings(&["ps", "--filter", &filter, "--format", "{{.Names}}"]);
        let out = self.run(&args).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn is_not_found(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such") || lower.contains("not found")
}

fn network_create_args(network: &str, internal: bool) -> Vec<String> {
    let mut args = strings(&["network", "create"]);
    if internal {
        args.push("--internal".to_string());
    }
    args.push(network.to_string());
    args
}

fn proxy_run_args(spec: &ProxySpec) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--network".to_string(),
        spec.network.clone(),
        "--label".to_string(),
        PROXY_LABEL.to_string(),
        "-v".to_string(),
        format!("{}:{}:ro", spec.config_path.display(), spec.config_mount),
        spec.image.clone(),
    ]
}

/// First IPv4 CIDR in `network inspect` output, falling back to any CIDR.
fn parse_subnet(output: &str) -> Option<String> {
    let cidrs: Vec<&str> = output
        .split_whitespace()
        .filter(|s| s.contains('/'))
        .collect();
    cidrs
        .iter()
        .find(|s| !s.contains(':'))
        .or_else(|| cidrs.first())
        .map(|s| s.to_string())
}
