//! Output redaction of retrieved secrets.
//!
//! Obtained from [`MediationSession::redactor`](crate::session::MediationSession::redactor)
//! by whatever relays the agent's terminal output to a human or a log.

use std::borrow::Cow;
use std::sync::Arc;

use zeroize::Zeroizing;

use super::state::VaultState;

/// Replaces secret values handed out this session with placeholders.
///
/// Longer values are replaced first so a secret that contains another is
/// not partially revealed.
#[derive(Clone)]
pub struct Redactor {
    state: Arc<VaultState>,
}

impl Redactor {
    /// Redactor reading `state`'s retrieved-secrets index.
    pub fn new(state: Arc<VaultState>) -> Self {
        Self { state }
    }

    /// Placeholder for the secret named `key`.
    pub fn placeholder(key: &str) -> String {
        format!("[REDACTED:{key}]")
    }

    fn secrets(&self) -> Vec<(Zeroizing<String>, String)> {
        let mut secrets = self.state.retrieved_snapshot();
        secrets.retain(|(value, _)| !value.is_empty());
        secrets.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.1.cmp(&b.1)));
        secrets
    }

    /// Redact text. Borrows when nothing matched.
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for (value, key) in self.secrets() {
            if out.contains(value.as_str()) {
                out = Cow::Owned(out.replace(value.as_str(), &Self::placeholder(&key)));
            }
        }
        out
    }

    /// Redact raw terminal bytes, which need not be valid UTF-8.
    pub fn redact_bytes<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        let mut out = Cow::Borrowed(data);
        for (value, key) in self.secrets() {
            if let Some(replaced) =
                replace_bytes(&out, value.as_bytes(), Self::placeholder(&key).as_bytes())
            {
                out = Cow::Owned(replaced);
            }
        }
        out
    }
}

/// Replace every occurrence of `needle`; `None` when there is none.
fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }

    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    let mut found = false;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
            found = true;
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    found.then_some(out)
}
