//! Dynamic egress firewall.
//!
//! Agents reach the network only through a filtering proxy. This module
//! turns the allowlist plus per-session grants into proxy configuration and
//! keeps the running proxy in sync.
//!
//! ```text
//! allow_domain ─> normalize ─> SessionRegistry ─┐
//!                                               ├─> ProxyConfigGenerator ─> squid.conf ─> reload
//!                 Allowlist (persistent+session)┘
//! ```

mod allowlist;
mod config;
mod controller;
mod error;
mod handlers;
mod normalize;
mod registry;

pub use allowlist::Allowlist;
pub use config::{BLOCK_ALL_SENTINEL, DEFAULT_PROXY_PORT, GeneratedConfig, ProxyConfigGenerator};
pub use controller::{FirewallController, FirewallSettings, PROXY_CONFIG_FILE, ProxyAction, SESSIONS_DIR};
pub use error::{FirewallError, FirewallResult, NormalizeError};
pub use handlers::AllowDomainHandler;
pub use normalize::normalize;
pub use registry::{SessionRegistry, validate_container_name};
