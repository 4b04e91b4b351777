//! Domain normalization for proxy ACL entries.
//!
//! Every domain that ends up in the generated proxy configuration passes
//! through [`normalize`]. It accepts the shapes people actually type
//! (URLs, wildcards, `host:port`, bracketed IPv6) and produces the exact
//! form the ACL expects:
//!
//! - hostnames become `.example.com` ("this domain or any subdomain")
//! - IPv4 dotted quads, IPv6 literals and `localhost` are returned bare
//!
//! ```
//! use sandbox_broker::firewall::normalize;
//!
//! assert_eq!(normalize("https://API.GitHub.com/repos").unwrap(), ".api.github.com");
//! assert_eq!(normalize("*.pypi.org").unwrap(), ".pypi.org");
//! assert_eq!(normalize("10.0.0.1").unwrap(), "10.0.0.1");
//! assert_eq!(normalize("[::1]:8080").unwrap(), "::1");
//! ```

use std::net::Ipv4Addr;

use super::error::NormalizeError;

/// Maximum length of a DNS hostname.
const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Normalize a free-form hostname, URL or IP into a proxy ACL entry.
pub fn normalize(input: &str) -> Result<String, NormalizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let mut host = trimmed.to_ascii_lowercase();

    if let Some(idx) = host.find("://") {
        host = host[idx + 3..].to_string();
    }
    if let Some(idx) = host.find('/') {
        host.truncate(idx);
    }

    if let Some(rest) = host.strip_prefix("*.") {
        host = rest.to_string();
    } else if let Some(rest) = host.strip_prefix('.') {
        host = rest.to_string();
    }

    if let Some(inner) = host.strip_prefix('[') {
        return match inner.find(']') {
            Some(end) if end > 0 => Ok(inner[..end].to_string()),
            _ => Err(NormalizeError::Invalid(input.trim().to_string())),
        };
    }

    if let Some(rest) = host.strip_suffix('.') {
        host = rest.to_string();
    }

    let ipv6 = is_ipv6_literal(&host);

    if !ipv6
        && let Some(idx) = host.rfind(':')
    {
        host.truncate(idx);
    }

    if host.parse::<Ipv4Addr>().is_ok() {
        return Ok(host);
    }

    if host == "localhost" || ipv6 {
        return Ok(host);
    }

    if !is_valid_hostname(&host) {
        return Err(NormalizeError::Invalid(input.trim().to_string()));
    }

    Ok(format!(".{host}"))
}

/// Whether a string looks like a bare IPv6 literal.
fn is_ipv6_literal(host: &str) -> bool {
    host.contains(':') && host.chars().all(|c| c == ':' || c.is_ascii_hexdigit())
}

/// Validate a DNS hostname with at least two labels.
fn is_valid_hostname(host: &str) -> bool {
    if host.len() > MAX_HOSTNAME_LEN || !host.contains('.') {
        return false;
    }

    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
