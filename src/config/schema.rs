//! Configuration schema definitions.
//!
//! Every field defaults to "unset" (empty string, zero, `None`) so that a
//! partial file merges cleanly; the accessor methods fill in built-in
//! defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::firewall::FirewallSettings;
use crate::kv::FileKv;

/// Runtime binary used when none is configured.
pub const DEFAULT_RUNTIME: &str = "docker";

/// Vault helper used when none is configured.
pub const DEFAULT_VAULT_HELPER: &str = "sandbox-vault";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network policy settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Egress proxy settings.
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Vault helper settings.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Scratch store settings.
    #[serde(default)]
    pub kv: KvConfig,
}

impl Config {
    /// Merge another config into this one.
    ///
    /// Lists are appended; scalars are overridden when set.
    pub fn merge(&mut self, other: Config) {
        self.general.merge(other.general);
        self.network.merge(other.network);
        self.firewall.merge(other.firewall);
        self.vault.merge(other.vault);
        self.kv.merge(other.kv);
    }

    /// Container runtime binary.
    pub fn runtime_binary(&self) -> &str {
        if self.general.runtime.is_empty() {
            DEFAULT_RUNTIME
        } else {
            &self.general.runtime
        }
    }

    /// Firewall settings with built-in defaults for unset fields.
    pub fn firewall_settings(&self) -> FirewallSettings {
        let mut settings = FirewallSettings::default();
        let fw = &self.firewall;

        let overrides = [
            (&fw.proxy_image, &mut settings.proxy_image),
            (&fw.proxy_container, &mut settings.proxy_container),
            (&fw.internal_network, &mut settings.internal_network),
            (&fw.egress_network, &mut settings.egress_network),
            (&fw.agent_label, &mut settings.agent_label),
        ];
        for (configured, target) in overrides {
            if !configured.is_empty() {
                target.clone_from(configured);
            }
        }
        if fw.proxy_port != 0 {
            settings.proxy_port = fw.proxy_port;
        }
        if let Some(ref dir) = fw.state_dir {
            settings.state_dir = dir.clone();
        }
        settings
    }

    /// Vault helper program and leading arguments.
    pub fn vault_helper(&self) -> (String, Vec<String>) {
        let program = if self.vault.helper.is_empty() {
            DEFAULT_VAULT_HELPER.to_string()
        } else {
            self.vault.helper.clone()
        };
        (program, self.vault.helper_args.clone())
    }

    /// Scratch store file.
    pub fn kv_path(&self) -> PathBuf {
        self.kv.path.clone().unwrap_or_else(FileKv::default_path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub log_level: String,

    /// Container runtime binary (`docker`, `podman`, or a path).
    #[serde(default)]
    pub runtime: String,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
        if !other.runtime.is_empty() {
            self.runtime = other.runtime;
        }
    }
}

/// Network policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Domains every agent may reach without prompting.
    ///
    /// Entries are normalized; `*.example.com`, `example.com` and
    /// `https://example.com/` are equivalent.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl NetworkConfig {
    fn merge(&mut self, other: NetworkConfig) {
        self.allowlist.extend(other.allowlist);
    }
}

/// Egress proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FirewallConfig {
    /// Proxy image reference.
    #[serde(default)]
    pub proxy_image: String,

    /// Proxy container name.
    #[serde(default)]
    pub proxy_container: String,

    /// Network shared by agents and the proxy.
    #[serde(default)]
    pub internal_network: String,

    /// Network giving the proxy its route out.
    #[serde(default)]
    pub egress_network: String,

    /// Label identifying agent containers.
    #[serde(default)]
    pub agent_label: String,

    /// Proxy listen port. 0 = default.
    #[serde(default)]
    pub proxy_port: u16,

    /// Directory for the generated config and session files.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl FirewallConfig {
    fn merge(&mut self, other: FirewallConfig) {
        let pairs = [
            (&mut self.proxy_image, other.proxy_image),
            (&mut self.proxy_container, other.proxy_container),
            (&mut self.internal_network, other.internal_network),
            (&mut self.egress_network, other.egress_network),
            (&mut self.agent_label, other.agent_label),
        ];
        for (target, value) in pairs {
            if !value.is_empty() {
                *target = value;
            }
        }
        if other.proxy_port != 0 {
            self.proxy_port = other.proxy_port;
        }
        if other.state_dir.is_some() {
            self.state_dir = other.state_dir;
        }
    }
}

/// Vault helper configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct VaultConfig {
    /// Helper executable.
    #[serde(default)]
    pub helper: String,

    /// Arguments placed before the helper's subcommand.
    #[serde(default)]
    pub helper_args: Vec<String>,
}

impl VaultConfig {
    fn merge(&mut self, other: VaultConfig) {
        if !other.helper.is_empty() {
            self.helper = other.helper;
            self.helper_args = other.helper_args;
        }
    }
}

/// Scratch store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct KvConfig {
    /// Store file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl KvConfig {
    fn merge(&mut self, other: KvConfig) {
        if other.path.is_some() {
            self.path = other.path;
        }
    }
}

/// User's persistent allowlist (stored separately from main config).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct UserAllowlist {
    /// Persistently allowed domains.
    #[serde(default)]
    pub domains: AllowedDomains,
}

/// Domains section of the user allowlist.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AllowedDomains {
    /// List of allowed domain names.
    #[serde(default)]
    pub allowed: Vec<String>,
}
