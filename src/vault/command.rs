//! Vault backend delegating to an external helper executable.
//!
//! # Helper Protocol
//!
//! ```text
//! <helper> [args..] dump --workspace W          stdin: password\n
//!                                               stdout: {"KEY":"value",...}
//! <helper> [args..] set --workspace W --key K   stdin: password\nvalue
//! ```
//!
//! Non-zero exit is failure; stderr carries the reason. A failing `dump`
//! is reported as an unlock failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use zeroize::Zeroizing;

use super::backend::{SecretMap, VaultBackend, VaultStore};
use super::error::{VaultError, VaultResult};

/// Vault backed by a helper command.
#[derive(Debug, Clone)]
pub struct CommandVault {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandVault {
    /// Use `program`, prefixing every invocation with `args`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run the helper with `input` on stdin; returns stdout on success.
    async fn invoke(&self, args: &[String], input: &[u8]) -> VaultResult<Zeroizing<Vec<u8>>> {
        let command = self.describe(args);
        debug!("Running vault helper: {}", command);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = Zeroizing::new(output.stdout);
        if !output.status.success() {
            return Err(VaultError::Helper {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl VaultBackend for CommandVault {
    async fn open(&self, workspace: &str, password: &str) -> VaultResult<Box<dyn VaultStore>> {
        let args = vec![
            "dump".to_string(),
            "--workspace".to_string(),
            workspace.to_string(),
        ];
        let input = Zeroizing::new(format!("{password}\n"));

        let stdout = match self.invoke(&args, input.as_bytes()).await {
            Ok(stdout) => stdout,
            Err(VaultError::Helper { stderr, .. }) => return Err(VaultError::Unlock(stderr)),
            Err(e) => return Err(e),
        };

        let parsed: HashMap<String, String> = serde_json::from_slice(&stdout)
            .map_err(|e| VaultError::Malformed(e.to_string()))?;
        let secrets = parsed
            .into_iter()
            .map(|(k, v)| (k, Zeroizing::new(v)))
            .collect();

        Ok(Box::new(CommandStore {
            vault: self.clone(),
            workspace: workspace.to_string(),
            password: Zeroizing::new(password.to_string()),
            secrets,
        }))
    }
}

struct CommandStore {
    vault: CommandVault,
    workspace: String,
    password: Zeroizing<String>,
    secrets: SecretMap,
}

#[async_trait]
impl VaultStore for CommandStore {
    async fn get(&self, key: &str) -> VaultResult<Option<Zeroizing<String>>> {
        Ok(self.secrets.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> VaultResult<()> {
        let args = vec![
            "set".to_string(),
            "--workspace".to_string(),
            self.workspace.clone(),
            "--key".to_string(),
            key.to_string(),
        ];
        let input = Zeroizing::new(format!("{}\n{}", self.password.as_str(), value));
        self.vault.invoke(&args, input.as_bytes()).await?;
        self.secrets
            .insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    async fn all(&self) -> VaultResult<SecretMap> {
        Ok(self.secrets.clone())
    }

    async fn close(self: Box<Self>) -> VaultResult<()> {
        Ok(())
    }
}
