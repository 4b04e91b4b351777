//! Command-line interface definitions for sandbox-broker.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Host-side capability broker for sandboxed agent containers.
///
/// sandbox-broker gives a network-isolated container a narrow channel for
/// requesting outbound domains, vault secrets and scratch storage. Every
/// sensitive grant waits on a human decision.
#[derive(Parser, Debug)]
#[command(name = "sandbox-broker")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority.
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands for sandbox-broker.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve one agent container until Ctrl-C or until it stops.
    ///
    /// Prints `SANDBOX_BROKER_SOCKET=<path>` on stdout once listening; mount
    /// the socket's directory into the container and export that variable.
    Serve {
        /// Agent container name.
        #[arg(long, value_name = "NAME")]
        container: String,

        /// Vault workspace for this session.
        #[arg(long, value_name = "WORKSPACE", default_value = "default")]
        workspace: String,

        /// Pre-allow domain for this session (repeatable).
        ///
        /// Added to the container's session file without prompting and
        /// dropped when the session ends.
        #[arg(short = 'd', long = "allow-domain", value_name = "DOMAIN")]
        allow_domains: Vec<String>,
    },

    /// Stop the egress proxy and delete session files if no agent runs.
    Cleanup,

    /// Manage the persistent user allowlist.
    Allowlist {
        /// Action to perform.
        #[command(subcommand)]
        action: AllowlistCommand,
    },

    /// Send one request to the broker (hidden).
    ///
    /// Runs inside the container. Reads the socket path from
    /// `SANDBOX_BROKER_SOCKET` and prints the response payload as JSON.
    #[command(name = "internal-request", hide = true)]
    InternalRequest {
        /// Message type, e.g. `vault_get`.
        #[arg(value_name = "TYPE")]
        kind: String,

        /// JSON payload; defaults to `{}`.
        #[arg(value_name = "PAYLOAD")]
        payload: Option<String>,
    },
}

/// Persistent allowlist actions.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum AllowlistCommand {
    /// Print every persistently allowed domain.
    List,
    /// Allow a domain for all future sessions.
    Add {
        /// Domain, URL or IP.
        domain: String,
    },
    /// Remove a domain.
    Remove {
        /// Entry exactly as listed.
        domain: String,
    },
    /// Remove every domain.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_command() {
        let cli = Cli::parse_from([
            "sandbox-broker",
            "-vv",
            "serve",
            "--container",
            "agent-1",
            "-d",
            "api.example.com",
            "-d",
            "pypi.org",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Serve {
                container,
                workspace,
                allow_domains,
            } => {
                assert_eq!(container, "agent-1");
                assert_eq!(workspace, "default");
                assert_eq!(allow_domains, vec!["api.example.com", "pypi.org"]);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_requires_container() {
        assert!(Cli::try_parse_from(["sandbox-broker", "serve"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["sandbox-broker", "cleanup", "--config", "/tmp/x.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
        assert!(matches!(cli.command, Commands::Cleanup));
    }

    #[test]
    fn test_allowlist_commands() {
        let cli = Cli::parse_from(["sandbox-broker", "allowlist", "add", "pypi.org"]);
        match cli.command {
            Commands::Allowlist { action } => assert_eq!(
                action,
                AllowlistCommand::Add {
                    domain: "pypi.org".to_string()
                }
            ),
            _ => panic!("Expected Allowlist command"),
        }
    }

    #[test]
    fn test_internal_request_command() {
        let cli = Cli::parse_from([
            "sandbox-broker",
            "internal-request",
            "vault_get",
            r#"{"key":"TOKEN"}"#,
        ]);

        match cli.command {
            Commands::InternalRequest { kind, payload } => {
                assert_eq!(kind, "vault_get");
                assert_eq!(payload.as_deref(), Some(r#"{"key":"TOKEN"}"#));
            }
            _ => panic!("Expected InternalRequest command"),
        }
    }

    #[test]
    fn test_internal_request_payload_optional() {
        let cli = Cli::parse_from(["sandbox-broker", "internal-request", "vault_list"]);
        assert!(matches!(
            cli.command,
            Commands::InternalRequest { payload: None, .. }
        ));
    }
}
