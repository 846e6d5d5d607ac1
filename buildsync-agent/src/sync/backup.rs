//! Full backups and restores, locally or through a stored connection.

use super::orchestrator::SyncOrchestrator;
use crate::archive::{self, RestoreOptions, RestoreReport};
use crate::transport::{RemotePath, TransportBackend};
use crate::utils::errors::{Result, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Archive kept in the local backup directory
    Local(PathBuf),
    /// Archive uploaded and removed locally
    Uploaded { remote: RemotePath },
}

impl SyncOrchestrator {
    fn backup_backend(&self) -> Result<Arc<dyn TransportBackend>> {
        let backup = &self.config.backup;
        if !backup.profile.is_configured() {
            return Err(SyncError::ConfigurationIncomplete(format!(
                "backup connection {} has no host",
                backup.connection.number()
            )));
        }
        Ok(self.backend(&backup.profile))
    }

    /// Backup folder on the backup connection, below its base path.
    pub fn backup_remote_dir(&self) -> Result<RemotePath> {
        let backup = &self.config.backup;
        RemotePath::base(&backup.profile.base_path).join(&backup.remote_path)
    }

    fn restore_options(&self, wipe_first: bool) -> RestoreOptions {
        RestoreOptions {
            extract_root: self.paths.restore_root(&self.config.backup),
            addon_id: self.addon_id.clone(),
            wipe_first,
            temp_dir: self.paths.temp.clone(),
        }
    }

    /// Build a backup archive; upload it when saving to a connection is configured.
    pub fn create_backup(&self, cancel: &CancellationToken) -> Result<BackupOutcome> {
        let backup = &self.config.backup;
        let entries = archive::collect_backup_entries(&self.paths, &self.includes, backup.include_addon_data);
        let check = || cancel.is_cancelled();

        if !backup.save_to_connection {
            let zip = archive::create_backup(&entries, &self.paths.backup_dir(backup), &self.addon_id, &check)?;
            return Ok(BackupOutcome::Local(zip));
        }

        let backend = self.backup_backend()?;
        let remote_dir = self.backup_remote_dir()?;
        let zip = archive::create_backup(&entries, &self.paths.backup_upload_dir(), &self.addon_id, &check)?;
        let file_name = zip
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let remote = remote_dir.join(&file_name)?;

        if !backend.ensure_folder(&remote_dir) {
            warn!("Could not create {} on the backup connection", remote_dir);
        }
        backend.upload(&zip, &remote)?;
        if let Err(e) = fs::remove_file(&zip) {
            warn!("Could not remove {}: {}", zip.display(), e);
        }
        info!("Backup uploaded to {}", remote);
        Ok(BackupOutcome::Uploaded { remote })
    }

    /// Validate and restore a local archive.
    pub fn restore_local(&self, zip: &Path, wipe_first: bool, cancel: &CancellationToken) -> Result<RestoreReport> {
        archive::validate_backup(zip, &self.addon_id)?;
        let check = || cancel.is_cancelled();
        archive::restore_from_zip(zip, &self.restore_options(wipe_first), &check)
    }

    /// Download `name` from the backup connection into the temp directory and restore it.
    /// The downloaded copy is always removed.
    pub fn restore_remote(&self, name: &str, wipe_first: bool, cancel: &CancellationToken) -> Result<RestoreReport> {
        if name.contains(['/', '\\']) || !archive::restore::is_backup_file_name(name) {
            return Err(SyncError::ValidationFailed(format!("{} is not a backup name", name)));
        }
        let backend = self.backup_backend()?;
        let remote = self.backup_remote_dir()?.join(name)?;

        fs::create_dir_all(&self.paths.temp)?;
        let download = self.paths.restore_download();
        let result = backend
            .download(&remote, &download)
            .and_then(|()| self.restore_local(&download, wipe_first, cancel));

        if download.exists() {
            if let Err(e) = fs::remove_file(&download) {
                warn!("Could not remove {}: {}", download.display(), e);
            }
        }
        result
    }

    /// Fetch a backup over HTTP(S) into the temp directory and restore it.
    /// The downloaded copy is always removed.
    pub fn restore_url(&self, url: &str, wipe_first: bool, cancel: &CancellationToken) -> Result<RestoreReport> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::ValidationFailed(format!("{} is not an http(s) URL", url)));
        }

        fs::create_dir_all(&self.paths.temp)?;
        let download = self.paths.url_download();
        let result = download_url(url, &download).and_then(|()| self.restore_local(&download, wipe_first, cancel));

        if download.exists() {
            if let Err(e) = fs::remove_file(&download) {
                warn!("Could not remove {}: {}", download.display(), e);
            }
        }
        result
    }

    /// Valid local backups, newest first.
    pub fn list_local_backups(&self) -> Vec<PathBuf> {
        archive::list_local_backups(&self.paths.backup_dir(&self.config.backup), &self.addon_id)
    }

    /// Backup names on the backup connection, newest name first.
    pub fn list_remote_backups(&self) -> Result<Vec<String>> {
        let backend = self.backup_backend()?;
        let names = backend.list_directory(&self.backup_remote_dir()?);
        Ok(archive::select_remote_backups(names))
    }
}

fn download_url(url: &str, target: &Path) -> Result<()> {
    let unavailable = |e: reqwest::Error| {
        error!("Download of {} failed: {}", url, e);
        SyncError::RemoteUnavailable(format!("{}: {}", url, e))
    };

    let mut response = reqwest::blocking::get(url).map_err(unavailable)?;
    if !response.status().is_success() {
        error!("Download of {} failed: HTTP {}", url, response.status());
        return Err(SyncError::RemoteUnavailable(format!("{}: HTTP {}", url, response.status())));
    }

    let mut file = fs::File::create(target)?;
    let bytes = response.copy_to(&mut file).map_err(unavailable)?;
    info!("Downloaded {} bytes from {}", bytes, url);
    Ok(())
}
