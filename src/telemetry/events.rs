//! Audit event types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Security-relevant events emitted by the broker.
///
/// Events name secrets by key only; values never appear here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A mediation session started for a container.
    SessionStart {
        /// Container the session serves.
        container: String,
        /// Vault workspace bound to the session.
        workspace: String,
        /// Broker process id.
        pid: u32,
    },

    /// A mediation session ended.
    SessionEnd {
        /// Container the session served.
        container: String,
        /// Session length in seconds.
        duration_sec: u64,
    },

    /// A human decided on an outbound domain request.
    DomainDecision {
        /// Requesting container.
        container: String,
        /// Normalized domain.
        domain: String,
        /// Outcome.
        decision: Decision,
    },

    /// A human decided on a secret read.
    SecretRead {
        /// Requesting container.
        container: String,
        /// Secret name.
        key: String,
        /// Outcome.
        decision: Decision,
    },

    /// A human decided on listing secret names.
    SecretList {
        /// Requesting container.
        container: String,
        /// Outcome.
        decision: Decision,
    },

    /// A human decided on a secret write.
    SecretWrite {
        /// Requesting container.
        container: String,
        /// Secret name.
        key: String,
        /// Outcome.
        decision: Decision,
    },

    /// An attempt to unlock the vault.
    VaultUnlock {
        /// Requesting container.
        container: String,
        /// Whether the backing store opened.
        success: bool,
    },

    /// The proxy configuration was regenerated and applied.
    ProxyReload {
        /// Number of ACL entries in the new configuration.
        domains: usize,
        /// Whether the proxy accepted it.
        success: bool,
    },
}

/// Outcome of an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// The human approved.
    Allow,
    /// The human denied.
    Deny,
}

impl From<bool> for Decision {
    fn from(approved: bool) -> Self {
        if approved { Decision::Allow } else { Decision::Deny }
    }
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The event, flattened alongside the timestamp.
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json(event: &AuditEvent) -> String {
        serde_json::to_string(&event.with_timestamp()).unwrap()
    }

    #[test]
    fn test_session_start_serialization() {
        let json = to_json(&AuditEvent::SessionStart {
            container: "agent-1".to_string(),
            workspace: "default".to_string(),
            pid: 12345,
        });

        assert!(json.contains("\"event\":\"session_start\""));
        assert!(json.contains("\"container\":\"agent-1\""));
        assert!(json.contains("\"pid\":12345"));
        assert!(json.contains("\"ts\""));
    }

    #[test]
    fn test_secret_read_serialization() {
        let json = to_json(&AuditEvent::SecretRead {
            container: "agent-1".to_string(),
            key: "GITHUB_TOKEN".to_string(),
            decision: Decision::Deny,
        });

        assert!(json.contains("\"event\":\"secret_read\""));
        assert!(json.contains("\"key\":\"GITHUB_TOKEN\""));
        assert!(json.contains("\"decision\":\"deny\""));
    }

    #[test]
    fn test_proxy_reload_serialization() {
        let json = to_json(&AuditEvent::ProxyReload {
            domains: 4,
            success: false,
        });

        assert!(json.contains("\"event\":\"proxy_reload\""));
        assert!(json.contains("\"domains\":4"));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn test_decision_from_bool() {
        assert_eq!(Decision::from(true), Decision::Allow);
        assert_eq!(Decision::from(false), Decision::Deny);
    }
}
