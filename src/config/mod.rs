//! Opgraph Configuration Module
//!
//! - `EngineConfig`: persistent engine settings in `~/.config/opgraph/config.toml`
//! - `RunConfig`: bound values for one job (`ops`, `resources`, `inputs`)
//! - `ConfigSchema`: declared field types, validated at build time
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`OPGRAPH_STORAGE_ROOT`, `OPGRAPH_TIMEZONE`)
//! 2. Config file (`~/.config/opgraph/config.toml`)
//! 3. Defaults

mod run;
mod schema;

pub use run::{RunConfig, SectionConfig};
pub use schema::{ConfigSchema, ConfigType, ConfigValues, FieldSpec};
pub(crate) use schema::value_type_name;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OpgraphError, Result};
use crate::storage::StorageBackend;

pub const ENV_STORAGE_ROOT: &str = "OPGRAPH_STORAGE_ROOT";
pub const ENV_TIMEZONE: &str = "OPGRAPH_TIMEZONE";

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// tracing-subscriber EnvFilter directive (RUST_LOG wins when set)
    pub log_filter: Option<String>,
}

/// Which backend holds artifacts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Filesystem,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            backend: BackendKind::default(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./history")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl EngineConfig {
    /// Returns `~/.config/opgraph/` on Unix, `%APPDATA%/opgraph/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("opgraph")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default path
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| OpgraphError::InvalidEngineConfig {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| OpgraphError::InvalidEngineConfig {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Save configuration, creating the parent directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| OpgraphError::InvalidEngineConfig {
                reason: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| OpgraphError::InvalidEngineConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| OpgraphError::InvalidEngineConfig {
            reason: format!("Failed to write config file: {}", e),
        })?;

        Ok(())
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Merge with an arbitrary variable lookup
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup(ENV_STORAGE_ROOT).filter(|v| !v.is_empty()) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(tz) = lookup(ENV_TIMEZONE).filter(|v| !v.is_empty()) {
            self.schedule.timezone = tz;
        }
        self
    }

    /// Storage backend described by this config
    pub fn storage_backend(&self) -> StorageBackend {
        match self.storage.backend {
            BackendKind::Filesystem => StorageBackend::filesystem(&self.storage.root),
            BackendKind::Memory => StorageBackend::memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_contains_opgraph() {
        let path = EngineConfig::config_path();
        assert!(path.to_string_lossy().contains("opgraph"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = EngineConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.storage.root, PathBuf::from("./history"));
        assert_eq!(cfg.schedule.timezone, "UTC");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = EngineConfig::default();
        cfg.storage.backend = BackendKind::Memory;
        cfg.schedule.timezone = "US/Pacific".to_string();
        cfg.save_to(&path).unwrap();

        assert_eq!(EngineConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "storage = [unterminated").unwrap();

        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("OPG-005"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let cfg = EngineConfig::default().with_env_from(|key| match key {
            ENV_STORAGE_ROOT => Some("/data/runs".to_string()),
            ENV_TIMEZONE => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.storage.root, PathBuf::from("/data/runs"));
        // empty values are ignored
        assert_eq!(cfg.schedule.timezone, "UTC");
    }
}
