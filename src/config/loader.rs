//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Built-in defaults
//! 2. System config: `/etc/sandbox-broker/config.toml`
//! 3. User config: `~/.config/sandbox-broker/config.toml`
//! 4. User allowlist: `~/.config/sandbox-broker/allowlist.toml`
//! 5. Additional config file (via `--config` flag)
//!
//! Lists (allowlist) are **merged** (appended).
//! Scalars (runtime, proxy_port) are **overridden**.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::{Config, NetworkConfig, UserAllowlist};
use crate::firewall::normalize;

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/sandbox-broker/config.toml";

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "sandbox-broker";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// User allowlist filename.
pub const USER_ALLOWLIST_FILE: &str = "allowlist.toml";

/// Configuration loader with support for hierarchy merging.
pub struct ConfigLoader {
    /// Path to system-wide configuration.
    system_path: PathBuf,
    /// Path to user configuration.
    user_path: PathBuf,
    /// Path to user allowlist.
    allowlist_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with default paths.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: user_config_dir.join(USER_CONFIG_FILE),
            allowlist_path: user_config_dir.join(USER_ALLOWLIST_FILE),
        }
    }

    /// Create a ConfigLoader with custom paths (for testing).
    #[must_use]
    pub fn with_paths(system_path: PathBuf, user_path: PathBuf, allowlist_path: PathBuf) -> Self {
        Self {
            system_path,
            user_path,
            allowlist_path,
        }
    }

    /// Load and merge configuration from all sources.
    ///
    /// Missing system/user files are skipped; a missing `explicit` file is
    /// an error. Invalid TOML is always an error.
    pub fn load(&self, explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        for (label, path) in [("system", &self.system_path), ("user", &self.user_path)] {
            match self.load_file(path)? {
                Some(file_config) => {
                    config.merge(file_config);
                    debug!("Loaded {} config from {:?}", label, path);
                }
                None => debug!("No {} config found at {:?}", label, path),
            }
        }

        let allowlist = self.load_user_allowlist()?;
        if !allowlist.domains.allowed.is_empty() {
            debug!(
                "Loaded {} domain(s) from user allowlist {:?}",
                allowlist.domains.allowed.len(),
                self.allowlist_path
            );
            config.merge(Config {
                network: NetworkConfig {
                    allowlist: allowlist.domains.allowed,
                },
                ..Default::default()
            });
        }

        if let Some(path) = explicit {
            match self.load_file(path)? {
                Some(cli_config) => {
                    config.merge(cli_config);
                    debug!("Loaded additional config from {:?}", path);
                }
                None => {
                    return Err(ConfigError::ReadError {
                        path: path.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        Ok(config)
    }

    /// Load the user's persistent allowlist.
    pub fn load_user_allowlist(&self) -> Result<UserAllowlist, ConfigError> {
        match fs::read_to_string(&self.allowlist_path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: self.allowlist_path.clone(),
                source: e,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserAllowlist::default()),
            Err(e) => Err(ConfigError::ReadError {
                path: self.allowlist_path.clone(),
                source: e,
            }),
        }
    }

    /// Save a domain to the user's persistent allowlist.
    ///
    /// The entry is stored as given but must normalize.
    pub fn save_to_allowlist(&self, domain: &str) -> Result<(), ConfigError> {
        normalize(domain).map_err(|e| ConfigError::InvalidValue {
            field: "domains.allowed".to_string(),
            message: e.to_string(),
        })?;

        let mut allowlist = self.load_user_allowlist()?;
        if !allowlist.domains.allowed.iter().any(|d| d == domain) {
            allowlist.domains.allowed.push(domain.to_string());
        }
        self.write_allowlist(&allowlist)
    }

    /// Remove a domain from the user's persistent allowlist.
    ///
    /// Returns whether it was present.
    pub fn remove_from_allowlist(&self, domain: &str) -> Result<bool, ConfigError> {
        let mut allowlist = self.load_user_allowlist()?;
        let before = allowlist.domains.allowed.len();
        allowlist.domains.allowed.retain(|d| d != domain);
        let removed = allowlist.domains.allowed.len() != before;
        if removed {
            self.write_allowlist(&allowlist)?;
            debug!("Removed domain '{}' from allowlist", domain);
        }
        Ok(removed)
    }

    /// Clear all entries from the user's persistent allowlist.
    pub fn clear_allowlist(&self) -> Result<(), ConfigError> {
        self.write_allowlist(&UserAllowlist::default())?;
        debug!("Cleared all entries from allowlist");
        Ok(())
    }

    /// Get the path to the allowlist file.
    pub fn allowlist_path(&self) -> &Path {
        &self.allowlist_path
    }

    fn write_allowlist(&self, allowlist: &UserAllowlist) -> Result<(), ConfigError> {
        if let Some(parent) = self.allowlist_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(allowlist)?;
        fs::write(&self.allowlist_path, contents).map_err(|e| ConfigError::WriteError {
            path: self.allowlist_path.clone(),
            source: e,
        })?;

        debug!("Wrote allowlist to {:?}", self.allowlist_path);
        Ok(())
    }

    /// Load a config file, returning None if it doesn't exist.
    fn load_file(&self, path: &Path) -> Result<Option<Config>, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config =
                    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn loader() -> (TempDir, ConfigLoader) {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::with_paths(
            dir.path().join("system.toml"),
            dir.path().join("user.toml"),
            dir.path().join("allowlist.toml"),
        );
        (dir, loader)
    }

    #[test]
    fn test_missing_files_use_defaults() {
        let (_dir, loader) = loader();
        let config = loader.load(None).unwrap();

        assert!(config.network.allowlist.is_empty());
        assert_eq!(config.runtime_binary(), "docker");
    }

    #[test]
    fn test_user_config_overrides_system() {
        let (dir, loader) = loader();
        fs::write(
            dir.path().join("system.toml"),
            "[general]\nruntime = \"docker\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("user.toml"),
            "[general]\nruntime = \"podman\"\n",
        )
        .unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(config.runtime_binary(), "podman");
    }

    #[test]
    fn test_lists_are_merged() {
        let (dir, loader) = loader();
        fs::write(
            dir.path().join("system.toml"),
            "[network]\nallowlist = [\"pypi.org\"]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("user.toml"),
            "[network]\nallowlist = [\"custom.example.com\"]\n",
        )
        .unwrap();
        loader.save_to_allowlist("saved.example.com").unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(
            config.network.allowlist,
            vec!["pypi.org", "custom.example.com", "saved.example.com"]
        );
    }

    #[test]
    fn test_explicit_file_applied_last() {
        let (dir, loader) = loader();
        fs::write(dir.path().join("user.toml"), "[firewall]\nproxy_port = 3129\n").unwrap();
        let extra = dir.path().join("extra.toml");
        fs::write(&extra, "[firewall]\nproxy_port = 8888\n").unwrap();

        let config = loader.load(Some(extra.as_path())).unwrap();
        assert_eq!(config.firewall.proxy_port, 8888);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let (dir, loader) = loader();
        let result = loader.load(Some(dir.path().join("absent.toml").as_path()));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, loader) = loader();
        fs::write(dir.path().join("system.toml"), "this is not valid TOML [[[").unwrap();

        let result = loader.load(None);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_save_remove_clear_allowlist() {
        let (_dir, loader) = loader();

        loader.save_to_allowlist("a.example.com").unwrap();
        loader.save_to_allowlist("a.example.com").unwrap();
        loader.save_to_allowlist("b.example.com").unwrap();
        assert_eq!(
            loader.load_user_allowlist().unwrap().domains.allowed,
            vec!["a.example.com", "b.example.com"]
        );

        assert!(loader.remove_from_allowlist("a.example.com").unwrap());
        assert!(!loader.remove_from_allowlist("a.example.com").unwrap());

        loader.clear_allowlist().unwrap();
        assert!(loader.load_user_allowlist().unwrap().domains.allowed.is_empty());
    }

    #[test]
    fn test_invalid_domain_not_saved() {
        let (_dir, loader) = loader();
        let result = loader.save_to_allowlist("not a domain!!");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert!(!loader.allowlist_path().exists());
    }
}
