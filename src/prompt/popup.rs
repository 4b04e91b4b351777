//! Tmux popup prompts rendered inside the agent container.
//!
//! # Popup Layout
//!
//! ```text
//! +------------------- sandbox-broker: Vault read -------------------+
//! | The agent wants to read secret GITHUB_TOKEN                       |
//! | Allow?                                                            |
//! |                                                                   |
//! | [y/N]                                                             |
//! +-------------------------------------------------------------------+
//! ```
//!
//! The popup's command exits 0 for approval and [`DECLINED_STATUS`] for a
//! denial or dismissal. Any other status means the popup itself could not
//! run (no tmux, no server, container gone) and is reported as an error.
//! Passwords are written by the popup to a per-request file inside the
//! container, read back with a second exec, and removed with a third.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::error::{PromptError, PromptResult};
use super::{PromptRequest, Prompter};
use crate::runtime::{ContainerRuntime, ExecOutput};

/// Popup width in columns.
const POPUP_WIDTH: &str = "72";

/// Popup height in lines.
const POPUP_HEIGHT: &str = "10";

/// Directory for password hand-off files inside the container.
const PASSWORD_DIR: &str = "/tmp";

/// Exit status of a popup the human answered with "no" or dismissed.
pub const DECLINED_STATUS: i32 = 10;

/// `$1` is the message.
const CONFIRM_SCRIPT: &str = r#"trap 'exit 10' INT HUP TERM; printf '%s\n\n[y/N] ' "$1"; read -r answer || exit 10; case "$answer" in y|Y|yes|YES) exit 0 ;; *) exit 10 ;; esac"#;

/// `$1` is the message, `$2` the hand-off file.
const PASSWORD_SCRIPT: &str = r#"trap 'stty echo; exit 10' INT HUP TERM; printf '%s\n\nPassword: ' "$1"; stty -echo; IFS= read -r pw; status=$?; stty echo; [ $status -eq 0 ] && [ -n "$pw" ] || exit 10; umask 077; printf '%s' "$pw" > "$2" || exit 1"#;

/// Prompter that pops up over the agent's tmux session.
pub struct PopupPrompter {
    runtime: Arc<dyn ContainerRuntime>,
    container: String,
}

impl PopupPrompter {
    /// Prompt inside `container`.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, container: impl Into<String>) -> Self {
        Self {
            runtime,
            container: container.into(),
        }
    }

    async fn exec(&self, argv: Vec<String>) -> PromptResult<ExecOutput> {
        Ok(self.runtime.exec(&self.container, &argv).await?)
    }

    async fn remove_file(&self, path: &str) {
        let argv = vec!["rm".to_string(), "-f".to_string(), path.to_string()];
        match self.exec(argv).await {
            Ok(out) if out.success() => {}
            Ok(out) => warn!("Failed to remove {} in {}: {}", path, self.container, out.stderr),
            Err(e) => warn!("Failed to remove {} in {}: {}", path, self.container, e),
        }
    }
}

#[async_trait]
impl Prompter for PopupPrompter {
    async fn confirm(&self, request: &PromptRequest) -> PromptResult<bool> {
        let command = shell_command(CONFIRM_SCRIPT, &[&request.message]);
        let output = self.exec(popup_args(&request.title, command)).await?;
        debug!(
            "Popup '{}' in {} exited {}",
            request.title, self.container, output.status
        );
        match output.status {
            0 => Ok(true),
            DECLINED_STATUS => Ok(false),
            _ => Err(popup_failure(&output)),
        }
    }

    async fn password(&self, request: &PromptRequest) -> PromptResult<Zeroizing<String>> {
        let path = format!("{}/.sandbox-broker-{}", PASSWORD_DIR, Uuid::new_v4());

        let command = shell_command(PASSWORD_SCRIPT, &[&request.message, &path]);
        let output = self.exec(popup_args(&request.title, command)).await?;
        if !output.success() {
            self.remove_file(&path).await;
            return Err(match output.status {
                DECLINED_STATUS => PromptError::Cancelled,
                _ => popup_failure(&output),
            });
        }

        let read = self.exec(vec!["cat".to_string(), path.clone()]).await;
        self.remove_file(&path).await;

        let read = read?;
        let ok = read.success();
        let password = Zeroizing::new(read.stdout);
        if !ok {
            return Err(PromptError::Failed(format!(
                "could not read password: {}",
                read.stderr.trim()
            )));
        }
        if password.is_empty() {
            return Err(PromptError::Cancelled);
        }
        Ok(password)
    }
}

fn popup_failure(output: &ExecOutput) -> PromptError {
    let stderr = output.stderr.trim();
    PromptError::Failed(if stderr.is_empty() {
        format!("popup exited with status {}", output.status)
    } else {
        format!("popup exited with status {}: {}", output.status, stderr)
    })
}

/// Arguments for `tmux display-popup` running `command`.
fn popup_args(title: &str, command: String) -> Vec<String> {
    vec![
        "tmux".to_string(),
        "display-popup".to_string(),
        "-E".to_string(),
        "-T".to_string(),
        format!(" sandbox-broker: {title} "),
        "-w".to_string(),
        POPUP_WIDTH.to_string(),
        "-h".to_string(),
        POPUP_HEIGHT.to_string(),
        command,
    ]
}

/// `sh -c SCRIPT sh ARGS...` as one shell-quoted string.
fn shell_command(script: &str, args: &[&str]) -> String {
    let mut parts = vec!["sh".to_string(), "-c".to_string(), shell_quote(script), "sh".to_string()];
    parts.extend(args.iter().map(|a| shell_quote(a)));
    parts.join(" ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::RecordingRuntime;

    fn prompter(runtime: &Arc<RecordingRuntime>) -> PopupPrompter {
        PopupPrompter::new(Arc::clone(runtime) as Arc<dyn ContainerRuntime>, "agent-1")
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_popup_args_end_with_command() {
        let args = popup_args("Vault read", "sh -c 'x'".to_string());
        assert_eq!(args[0], "tmux");
        assert_eq!(args[1], "display-popup");
        assert_eq!(args.last().unwrap(), "sh -c 'x'");
    }

    #[tokio::test]
    async fn test_confirm_maps_exit_status() {
        let runtime = Arc::new(RecordingRuntime::new());
        runtime.push_exec(0, "");
        runtime.push_exec(DECLINED_STATUS, "");
        let p = prompter(&runtime);

        let req = PromptRequest::vault_read("TOKEN");
        assert!(p.confirm(&req).await.unwrap());
        assert!(!p.confirm(&req).await.unwrap());
        assert!(runtime.called("exec agent-1 tmux display-popup"));
    }

    #[tokio::test]
    async fn test_confirm_popup_failure_is_error() {
        let runtime = Arc::new(RecordingRuntime::new());
        // tmux not installed in the container
        runtime.push_exec(127, "");
        runtime.push_exec(1, "");
        let p = prompter(&runtime);

        let req = PromptRequest::allow_domain(".x.com");
        let err = p.confirm(&req).await.unwrap_err();
        assert!(matches!(err, PromptError::Failed(ref m) if m.contains("127")));
        assert!(matches!(p.confirm(&req).await, Err(PromptError::Failed(_))));
    }

    #[tokio::test]
    async fn test_password_reads_back_and_removes_file() {
        let runtime = Arc::new(RecordingRuntime::new());
        runtime.push_exec(0, "");
        runtime.push_exec(0, "hunter2");
        runtime.push_exec(0, "");
        let p = prompter(&runtime);

        let pw = p.password(&PromptRequest::vault_unlock("ws")).await.unwrap();
        assert_eq!(pw.as_str(), "hunter2");

        let calls = runtime.calls();
        assert!(calls[1].starts_with("exec agent-1 cat /tmp/.sandbox-broker-"));
        assert!(calls[2].starts_with("exec agent-1 rm -f /tmp/.sandbox-broker-"));
    }

    #[tokio::test]
    async fn test_dismissed_password_is_cancelled() {
        let runtime = Arc::new(RecordingRuntime::new());
        runtime.push_exec(DECLINED_STATUS, "");
        let p = prompter(&runtime);

        let err = p.password(&PromptRequest::vault_unlock("ws")).await.unwrap_err();
        assert!(matches!(err, PromptError::Cancelled));
        assert!(runtime.called("exec agent-1 rm -f"));
    }

    #[tokio::test]
    async fn test_broken_password_popup_is_error() {
        let runtime = Arc::new(RecordingRuntime::new());
        runtime.push_exec(1, "");
        let p = prompter(&runtime);

        let err = p.password(&PromptRequest::vault_unlock("ws")).await.unwrap_err();
        assert!(matches!(err, PromptError::Failed(_)));
        assert!(runtime.called("exec agent-1 rm -f"));
    }
}
