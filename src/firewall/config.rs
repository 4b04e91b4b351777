//! Proxy configuration generation.
//!
//! The proxy configuration is always rendered in full from a fixed template.
//! Inputs are the internal network's address range, the persistent
//! allowlist and the session URLs of every running container. Each domain
//! is normalized; entries that fail normalization are skipped with a
//! warning.
//!
//! # Fail-closed
//!
//! When no domain survives normalization the ACL still needs at least one
//! entry, otherwise the `http_access allow` line would be dropped or, worse,
//! rewritten by hand into something permissive. We emit a sentinel entry in
//! the reserved `.invalid` TLD so the allow rule can never match.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use tracing::warn;

use super::normalize::normalize;

/// Sentinel ACL entry used when no domain is allowed. `.invalid` is
/// reserved by RFC 2606 and never resolves.
pub const BLOCK_ALL_SENTINEL: &str = ".blocked.invalid";

/// Default proxy listen port.
pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// Result of rendering a proxy configuration.
#[derive(Debug, Clone)]
pub struct GeneratedConfig {
    /// Full configuration text.
    pub text: String,
    /// Normalized ACL entries, sorted, after dedup. Empty when fail-closed.
    pub domains: Vec<String>,
    /// Raw inputs that failed normalization.
    pub skipped: Vec<String>,
}

impl GeneratedConfig {
    /// Whether the configuration blocks every destination.
    pub fn is_block_all(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Renders squid configurations for the egress proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfigGenerator {
    internal_subnet: String,
    port: u16,
}

impl ProxyConfigGenerator {
    /// Create a generator for the given agent network range (CIDR).
    pub fn new(internal_subnet: impl Into<String>, port: u16) -> Self {
        Self {
            internal_subnet: internal_subnet.into(),
            port,
        }
    }

    /// Render the configuration from the persistent allowlist and the
    /// aggregated session URLs.
    pub fn generate<A, S>(&self, allowlist: A, session_urls: S) -> GeneratedConfig
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let mut normalized = BTreeSet::new();
        let mut skipped = Vec::new();

        for raw in allowlist
            .into_iter()
            .map(|d| d.as_ref().to_string())
            .chain(session_urls.into_iter().map(|d| d.as_ref().to_string()))
        {
            match normalize(&raw) {
                Ok(entry) => {
                    normalized.insert(entry);
                }
                Err(e) => {
                    warn!("Skipping firewall entry {:?}: {}", raw, e);
                    skipped.push(raw);
                }
            }
        }

        let domains = collapse_subdomains(normalized);
        let text = self.render(&domains);

        GeneratedConfig {
            text,
            domains,
            skipped,
        }
    }

    fn render(&self, domains: &[String]) -> String {
        let mut out = String::new();
        out.push_str("# Generated by sandbox-broker; rewritten in full on every change.\n");
        let _ = writeln!(out, "http_port {}", self.port);
        out.push('\n');
        let _ = writeln!(out, "acl agent_net src {}", self.internal_subnet);

        if domains.is_empty() {
            let _ = writeln!(out, "acl allowed_domains dstdomain {BLOCK_ALL_SENTINEL}");
        } else {
            for domain in domains {
                let _ = writeln!(out, "acl allowed_domains dstdomain {domain}");
            }
        }

        out.push_str(
            "\n\
             acl SSL_ports port 443\n\
             acl Safe_ports port 80\n\
             acl Safe_ports port 443\n\
             acl CONNECT method CONNECT\n\
             \n\
             http_access deny !Safe_ports\n\
             http_access deny CONNECT !SSL_ports\n\
             http_access allow agent_net allowed_domains\n\
             http_access deny all\n\
             \n\
             cache deny all\n\
             access_log stdio:/dev/stdout\n",
        );
        out
    }
}

/// Drop entries already covered by a parent `.domain` entry.
///
/// squid refuses to load a `dstdomain` ACL containing both `.a.com` and
/// `.b.a.com`.
fn collapse_subdomains(entries: BTreeSet<String>) -> Vec<String> {
    let parents: Vec<&String> = entries.iter().filter(|e| e.starts_with('.')).collect();

    entries
        .iter()
        .filter(|entry| {
            !parents
                .iter()
                .any(|parent| *parent != *entry && entry.ends_with(parent.as_str()))
        })
        .cloned()
        .collect()
}
