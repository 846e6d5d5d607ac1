//! Configuration management for the sync agent.
//!
//! Loads configuration from a TOML file. The `[settings]` table is the flat key/value store the
//! sync core reads through [`crate::settings::SettingsSource`]; the other sections describe the
//! local environment the agent runs in.

use crate::settings::SettingsSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity recorded in backup manifests and used for self-exclusion on restore.
pub const DEFAULT_ADDON_ID: &str = "plugin.program.dokukanal.buildsync";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    /// Host settings store (flat key/value table)
    #[serde(default)]
    pub settings: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity of this agent; written as manifest creator
    #[serde(default = "default_addon_id")]
    pub addon_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Media-center home directory (contains `userdata/` and `addons/`)
    pub home: Option<PathBuf>,

    /// Overrides `<home>/userdata`
    pub userdata: Option<PathBuf>,

    /// Overrides `<home>/temp`
    pub temp: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Inclusion list for full backups. Empty = whole userdata tree.
    #[serde(default)]
    pub include: Vec<BackupInclude>,
}

/// Where an inclusion entry is resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeBase {
    #[default]
    Userdata,
    AddonData,
}

/// One entry of the backup inclusion list. Exactly one of `file` / `folder` is expected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupInclude {
    pub file: Option<String>,
    pub folder: Option<String>,

    #[serde(default)]
    pub base: IncludeBase,

    /// Boolean settings key gating this entry
    pub setting: Option<String>,
}

impl BackupConfig {
    /// Inclusion entries whose gating setting (if any) is enabled.
    pub fn active_includes(&self, settings: &dyn SettingsSource) -> Vec<BackupInclude> {
        self.include
            .iter()
            .filter(|item| match &item.setting {
                Some(key) => settings.get_bool(key, false),
                None => true,
            })
            .cloned()
            .collect()
    }
}

fn default_addon_id() -> String {
    DEFAULT_ADDON_ID.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            addon_id: default_addon_id(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Home directory: configured value, else `$HOME/.kodi`.
    pub fn home_dir(&self) -> PathBuf {
        if let Some(home) = &self.paths.home {
            return home.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kodi")
    }
}
