use crate::result::CommonResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "easel.config.json";

/// Engine configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub io: IoConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Maximum number of snapshots kept by the history manager
    #[serde(default = "default_max_states")]
    pub max_states: usize,
}

fn default_max_states() -> usize {
    100
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_states: default_max_states(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Root directory of the file storage adapter
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    ".easel/store".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoConfig {
    /// Default export format tag (json, csv, xml)
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_true")]
    pub include_metadata: bool,

    #[serde(default)]
    pub compress: bool,

    #[serde(default)]
    pub encrypt: bool,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            include_metadata: true,
            compress: false,
            encrypt: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl EngineConfig {
    /// Load config from a directory, falling back to defaults when the file is absent
    pub fn load(cwd: impl AsRef<Path>) -> CommonResult<Self> {
        let config_path = Self::path_in(cwd);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EngineConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(EngineConfig::default())
        }
    }

    /// Write config into a directory
    pub fn save(&self, cwd: impl AsRef<Path>) -> CommonResult<PathBuf> {
        let config_path = Self::path_in(cwd);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn path_in(cwd: impl AsRef<Path>) -> PathBuf {
        cwd.as_ref().join(DEFAULT_CONFIG_NAME)
    }

    /// Get absolute path to the storage directory
    pub fn storage_dir(&self, cwd: impl AsRef<Path>) -> PathBuf {
        cwd.as_ref().join(&self.storage.dir)
    }
}
