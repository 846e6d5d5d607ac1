//! Local locations the sync core reads and writes.

use crate::config::Config;
use crate::settings::BackupSettings;
use std::path::{Path, PathBuf};

pub const FAVOURITES_FILE: &str = "favourites.xml";
pub const ADDON_DATA_ARCHIVE: &str = "addon_data.zip";
const STATIC_FAVOURITES_DIR: &str = "Static Favourites";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    /// Media-center home (`userdata/` and `addons/` live here)
    pub home: PathBuf,
    pub userdata: PathBuf,
    pub addons: PathBuf,
    pub temp: PathBuf,
    /// This agent's private data directory under `addon_data`
    pub addon_profile: PathBuf,
}

impl LocalPaths {
    pub fn new(home: &Path, addon_id: &str) -> Self {
        let userdata = home.join("userdata");
        Self {
            home: home.to_path_buf(),
            addons: home.join("addons"),
            temp: home.join("temp"),
            addon_profile: userdata.join("addon_data").join(addon_id),
            userdata,
        }
    }

    /// Apply the `[paths]` overrides from the configuration file.
    pub fn from_config(config: &Config) -> Self {
        let mut paths = Self::new(&config.home_dir(), &config.agent.addon_id);
        if let Some(userdata) = &config.paths.userdata {
            paths.addon_profile = userdata.join("addon_data").join(&config.agent.addon_id);
            paths.userdata = userdata.clone();
        }
        if let Some(temp) = &config.paths.temp {
            paths.temp = temp.clone();
        }
        paths
    }

    pub fn addon_data(&self) -> PathBuf {
        self.userdata.join("addon_data")
    }

    pub fn favourites(&self) -> PathBuf {
        self.userdata.join(FAVOURITES_FILE)
    }

    pub fn static_favourites_dir(&self, folder: &str) -> PathBuf {
        self.addon_profile.join(STATIC_FAVOURITES_DIR).join(folder)
    }

    pub fn static_favourites(&self, folder: &str) -> PathBuf {
        self.static_favourites_dir(folder).join(FAVOURITES_FILE)
    }

    /// Staging location of the addon-data archive.
    pub fn addon_data_archive(&self) -> PathBuf {
        self.userdata.join(ADDON_DATA_ARCHIVE)
    }

    /// Configured backup directory, else `<home>/backups`.
    pub fn backup_dir(&self, backup: &BackupSettings) -> PathBuf {
        match &backup.backup_path {
            Some(path) => PathBuf::from(path),
            None => self.home.join("backups"),
        }
    }

    /// Configured restore root, else home.
    pub fn restore_root(&self, backup: &BackupSettings) -> PathBuf {
        match &backup.restore_path {
            Some(path) => PathBuf::from(path),
            None => self.home.clone(),
        }
    }

    pub fn backup_upload_dir(&self) -> PathBuf {
        self.temp.join("backup_upload")
    }

    pub fn restore_download(&self) -> PathBuf {
        self.temp.join("restore_connection.zip")
    }

    /// Staging file for restores fetched over HTTP(S).
    pub fn url_download(&self) -> PathBuf {
        self.temp.join("restore_download.zip")
    }
}
