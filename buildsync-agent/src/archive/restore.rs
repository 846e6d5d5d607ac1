//! Validating, listing and restoring backups.

use super::backup::BACKUP_PREFIX;
use super::manifest::{BackupManifest, MANIFEST_FILE_NAME};
use super::policy::{contained_target, is_allowed_entry, is_directory_entry, is_self_entry, normalize_entry_name};
use super::{extract_entry, CancelCheck, RestoreReport};
use crate::utils::errors::{Result, SyncError};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

/// Temp subfolder kept when wiping before a restore.
const KEEP_ON_WIPE: &str = "archive_cache";

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Directory entries are extracted under (`userdata/...` and `addons/...` land below it)
    pub extract_root: PathBuf,
    /// Agent identity; its own `addon_data` is never overwritten
    pub addon_id: String,
    /// Empty `temp_dir` (except `archive_cache`) before extracting
    pub wipe_first: bool,
    pub temp_dir: PathBuf,
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Check structure, provenance and entry paths of a backup archive.
pub fn validate_backup(zip_path: &Path, creator: &str) -> Result<()> {
    if !has_zip_extension(zip_path) || !zip_path.is_file() {
        return Err(SyncError::ValidationFailed(format!(
            "{} is not a .zip file",
            zip_path.display()
        )));
    }

    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    if archive.is_empty() {
        return Err(SyncError::BadArchive("archive has no entries".to_string()));
    }
    let names: Vec<String> = archive.file_names().map(String::from).collect();

    if names.iter().any(|n| n == MANIFEST_FILE_NAME) {
        let mut raw = String::new();
        archive
            .by_name(MANIFEST_FILE_NAME)?
            .read_to_string(&mut raw)
            .map_err(|e| SyncError::ValidationFailed(format!("manifest unreadable: {}", e)))?;
        let manifest = BackupManifest::from_json(&raw)
            .map_err(|e| SyncError::ValidationFailed(format!("manifest invalid: {}", e)))?;
        if !manifest.is_trusted(creator) {
            return Err(SyncError::ValidationFailed(format!(
                "manifest creator {} version {} not accepted",
                manifest.creator, manifest.version
            )));
        }
    } else if !names
        .iter()
        .any(|n| normalize_entry_name(n).starts_with("userdata/"))
    {
        return Err(SyncError::ValidationFailed(
            "no manifest and no userdata/ entry".to_string(),
        ));
    }

    for name in &names {
        if name == MANIFEST_FILE_NAME || is_directory_entry(name) {
            continue;
        }
        if !is_allowed_entry(name) {
            return Err(SyncError::ValidationFailed(format!(
                "disallowed entry path {}",
                name
            )));
        }
    }

    Ok(())
}

/// `validate_backup` as a predicate; the reason is logged at debug.
pub fn is_valid_backup(zip_path: &Path, creator: &str) -> bool {
    match validate_backup(zip_path, creator) {
        Ok(()) => true,
        Err(e) => {
            debug!("Rejected backup {}: {}", zip_path.display(), e);
            false
        }
    }
}

/// Extract a backup under `options.extract_root`.
///
/// Every entry is re-checked (allow-list, self-exclusion, containment) regardless of prior
/// validation; rejected entries are counted as skipped. Per-entry write errors are counted as
/// failed and do not stop the restore. Cancellation leaves already extracted files in place.
pub fn restore_from_zip(
    zip_path: &Path,
    options: &RestoreOptions,
    cancel: CancelCheck<'_>,
) -> Result<RestoreReport> {
    if !has_zip_extension(zip_path) {
        return Err(SyncError::ValidationFailed(format!(
            "{} is not a .zip file",
            zip_path.display()
        )));
    }
    if !zip_path.is_file() {
        return Err(SyncError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", zip_path.display()),
        )));
    }

    if options.wipe_first {
        wipe_temp(&options.temp_dir, zip_path);
    }

    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let mut report = RestoreReport::default();
    fs::create_dir_all(&options.extract_root)?;

    for index in 0..archive.len() {
        if cancel() {
            info!(
                "Restore cancelled: {} extracted, {} skipped, {} failed so far",
                report.extracted, report.skipped, report.failed
            );
            return Err(SyncError::Cancelled);
        }

        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Unreadable archive entry #{}: {}", index, e);
                report.failed += 1;
                continue;
            }
        };
        let name = entry.name().to_string();

        if entry.is_dir() || is_directory_entry(&name) || name == MANIFEST_FILE_NAME {
            continue;
        }
        if !is_allowed_entry(&name) {
            debug!("Restore skip disallowed path: {}", name);
            report.skipped += 1;
            continue;
        }
        if is_self_entry(&name, &options.addon_id) {
            debug!("Restore skip own data: {}", name);
            report.skipped += 1;
            continue;
        }
        let Some(target) = contained_target(&options.extract_root, &name) else {
            warn!("Restore skip path escaping {}: {}", options.extract_root.display(), name);
            report.skipped += 1;
            continue;
        };

        match extract_entry(&mut entry, &options.extract_root, &target) {
            Ok(Some(_)) => report.extracted += 1,
            Ok(None) => {
                warn!("Restore skip path leaving {} through a symlink: {}", options.extract_root.display(), name);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Extract error {}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Restored {} into {}: {} extracted, {} skipped, {} failed",
        zip_path.display(),
        options.extract_root.display(),
        report.extracted,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// Remove everything in `temp_dir` except `archive_cache` and the archive being restored.
/// Errors are logged.
fn wipe_temp(temp_dir: &Path, keep: &Path) {
    let entries = match fs::read_dir(temp_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Nothing to wipe in {}: {}", temp_dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path == keep {
            continue;
        }
        let result = if path.is_dir() {
            if entry.file_name() == KEEP_ON_WIPE {
                continue;
            }
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            error!("Wipe temp {}: {}", path.display(), e);
        }
    }
}

/// Backup file name filter: `doku_backup_*.zip`.
pub fn is_backup_file_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.to_ascii_lowercase().ends_with(".zip")
}

/// Valid backups in `dir`, newest (mtime) first.
pub fn list_local_backups(dir: &Path, creator: &str) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("List backup dir {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut backups: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|entry| is_backup_file_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .filter(|path| is_valid_backup(path, creator))
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (path, modified)
        })
        .collect();

    backups.sort_by(|a, b| b.1.cmp(&a.1));
    backups.into_iter().map(|(path, _)| path).collect()
}

/// Backup names from a remote listing, newest first (names embed the date).
pub fn select_remote_backups(names: Vec<String>) -> Vec<String> {
    let mut backups: Vec<String> = names
        .into_iter()
        .filter(|name| is_backup_file_name(name))
        .collect();
    backups.sort_by(|a, b| b.cmp(a));
    backups
}
