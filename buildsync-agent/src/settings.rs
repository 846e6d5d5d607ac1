//! Settings access and the per-cycle sync configuration.
//!
//! The host environment exposes settings as a synchronous key/value store. Every cycle reads a
//! fresh [`SyncConfiguration`] from it, so a user changing settings mid-run takes effect on the
//! next tick.

use crate::transport::profile::{ConnectionProfile, ProfileSlot};
use std::collections::HashMap;

/// Synchronous key/value settings store with defaults.
pub trait SettingsSource {
    /// Raw string value, `None` when the key is absent.
    fn raw(&self, key: &str) -> Option<String>;

    fn get_string(&self, key: &str, default: &str) -> String {
        match self.raw(key) {
            Some(value) if !value.is_empty() => value,
            _ => default.to_string(),
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.raw(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "true" || v == "1" => true,
            Some(v) if v == "false" || v == "0" => false,
            _ => default,
        }
    }

    /// Integer setting; unparsable values fall back to `default`.
    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl SettingsSource for toml::Table {
    fn raw(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        }
    }
}

impl SettingsSource for HashMap<String, String> {
    fn raw(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// How a downloaded favourites file is combined with the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FavouritesSyncMode {
    /// Union of local and server, local order first
    #[default]
    Merge,
    /// Server copy is authoritative
    Overwrite,
}

impl FavouritesSyncMode {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overwrite" => FavouritesSyncMode::Overwrite,
            _ => FavouritesSyncMode::Merge,
        }
    }
}

/// Full-backup related settings.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub include_addon_data: bool,
    /// Local backup directory; `None` = `<home>/backups`
    pub backup_path: Option<String>,
    /// Restore root; `None` = home
    pub restore_path: Option<String>,
    pub save_to_connection: bool,
    pub connection: ProfileSlot,
    /// Profile of `connection`, used for backup upload and remote restore
    pub profile: ConnectionProfile,
    pub remote_path: String,
    pub restore_wipe: bool,
}

/// Everything one sync cycle needs, read once at the start of the cycle.
#[derive(Debug, Clone)]
pub struct SyncConfiguration {
    pub enabled: bool,
    pub is_main_system: bool,
    pub custom_folder: String,
    pub static_folders: Vec<String>,
    pub addon_sync: bool,
    pub favourites_sync_mode: FavouritesSyncMode,
    /// Minutes between periodic favourites syncs; 0 = startup only
    pub favourites_sync_interval_minutes: u64,
    /// Active connection profile (empty host when none is selected)
    pub profile: ConnectionProfile,
    pub backup: BackupSettings,
}

impl SyncConfiguration {
    /// Read every setting, repairing invalid values with defaults.
    pub fn load(settings: &dyn SettingsSource) -> Self {
        let static_folders = settings
            .get_string("static_folders", "")
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();

        let interval = settings.get_int("favourites_sync_interval_minutes", 20).max(0) as u64;

        let remote_path = settings
            .get_string("backup_remote_path", "backups")
            .trim()
            .trim_end_matches('/')
            .to_string();

        let backup_slot = ProfileSlot::from_setting(settings.get_int("backup_connection", 1))
            .unwrap_or(ProfileSlot::One);

        Self {
            enabled: settings.get_bool("enable_sync", false),
            is_main_system: settings.get_bool("is_main_system", true),
            custom_folder: settings.get_string("custom_folder", "").trim().to_string(),
            static_folders,
            addon_sync: settings.get_bool("addon_sync", true),
            favourites_sync_mode: FavouritesSyncMode::parse(
                &settings.get_string("favourites_sync_mode", "merge"),
            ),
            favourites_sync_interval_minutes: interval,
            profile: ConnectionProfile::active(settings),
            backup: BackupSettings {
                include_addon_data: settings.get_bool("backup_include_addon_data", true),
                backup_path: non_empty(settings.get_string("backup_path", "")),
                restore_path: non_empty(settings.get_string("restore_path", "")),
                save_to_connection: settings.get_bool("backup_save_to_connection", false),
                connection: backup_slot,
                profile: ConnectionProfile::from_slot(settings, backup_slot),
                remote_path: if remote_path.is_empty() {
                    "backups".to_string()
                } else {
                    remote_path
                },
                restore_wipe: settings.get_bool("restore_wipe", false),
            },
        }
    }

    /// `hasConnectionConfigured()`: the active profile has a non-blank host.
    pub fn has_connection_configured(&self) -> bool {
        self.profile.is_configured()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
