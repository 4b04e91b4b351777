//! Persistent allowlist.
//!
//! Domains from configuration and the user's allowlist file. Grants made
//! during a session are not kept here: the
//! [`SessionRegistry`](super::SessionRegistry) files are their only record,
//! so removing a container's file revokes everything it was granted.

use std::collections::BTreeSet;

/// Always-approved domains, as configured (not normalized).
#[derive(Debug, Default)]
pub struct Allowlist {
    persistent: BTreeSet<String>,
}

impl Allowlist {
    /// Create an allowlist from the persistent domain set.
    pub fn new<I, S>(persistent: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            persistent: persistent.into_iter().map(Into::into).collect(),
        }
    }

    /// The configured entries, sorted and deduplicated.
    pub fn domains(&self) -> Vec<String> {
        self.persistent.iter().cloned().collect()
    }
}
