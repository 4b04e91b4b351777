//! sandbox-broker: host-side capability broker for sandboxed agent containers
//!
//! An agent container runs on an internal network whose only way out is an
//! allowlisting egress proxy. This crate gives such a container a narrow,
//! human-gated channel for asking the host for more: an extra outbound
//! domain, a secret from the host vault, or a scratch key-value slot.
//!
//! # Security Model
//!
//! The security model is **fail-closed**: when in doubt, deny and log. A
//! failed proxy configuration blocks all traffic rather than none; a
//! cancelled prompt is a denial; secrets handed out are remembered so they
//! can be redacted from anything echoed back to the agent.
//!
//! # Architecture
//!
//! - **Control**: newline-delimited JSON over a per-session Unix socket
//! - **Firewall**: proxy config generation, session URL registry, reloads
//! - **Vault**: lazily unlocked secret store with redaction
//! - **Kv**: persistent scratch key-value store
//! - **Prompt**: human confirmation through a popup in the container's tmux
//! - **Session**: wires one container's handlers to one server
//! - **Config**: hierarchical TOML configuration
//! - **Telemetry**: structured syslog logging for audit trails

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod cli_handler;
pub mod config;
pub mod control;
pub mod firewall;
pub mod kv;
pub mod prompt;
pub mod runtime;
pub mod session;
pub mod telemetry;
pub mod vault;
