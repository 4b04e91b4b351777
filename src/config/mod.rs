//! Configuration system for sandbox-broker.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. System config: `/etc/sandbox-broker/config.toml`
//! 2. User config: `~/.config/sandbox-broker/config.toml`
//! 3. User allowlist: `~/.config/sandbox-broker/allowlist.toml`
//! 4. Additional config file (via `--config` flag)
//!
//! No file is required; unset values fall back to built-in defaults.
//!
//! # Example
//!
//! ```toml
//! [general]
//! runtime = "podman"
//!
//! [network]
//! allowlist = ["pypi.org", "*.github.com"]
//!
//! [firewall]
//! proxy_port = 3128
//!
//! [vault]
//! helper = "/usr/local/bin/sandbox-vault"
//!
//! [kv]
//! path = "/var/lib/sandbox-broker/kv.json"
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AllowedDomains, Config, FirewallConfig, GeneralConfig, KvConfig, NetworkConfig, UserAllowlist,
    VaultConfig,
};
