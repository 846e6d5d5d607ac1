//! Building full backups.

use super::manifest::{BackupManifest, MANIFEST_FILE_NAME};
use super::policy::is_allowed_entry;
use super::{entry_options, slash_path, ArchiveEntry, CancelCheck};
use crate::config::{BackupInclude, IncludeBase};
use crate::fs::walker::{walk_files, ExclusionRules};
use crate::paths::LocalPaths;
use crate::utils::errors::{Result, SyncError};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use zip::ZipWriter;

/// Only files with this prefix are treated as backups.
pub const BACKUP_PREFIX: &str = "doku_backup_";

/// `doku_backup_DDMMYYYY_HHMM.zip`
pub fn backup_file_name(now: DateTime<Local>) -> String {
    format!("{}{}.zip", BACKUP_PREFIX, now.format("%d%m%Y_%H%M"))
}

/// Resolve the source set: the inclusion list (or the whole userdata tree) under `userdata/`,
/// followed by the addons tree under `addons/`.
pub fn collect_backup_entries(
    paths: &LocalPaths,
    includes: &[BackupInclude],
    include_addon_data: bool,
) -> Vec<ArchiveEntry> {
    let mut userdata_files: Vec<(PathBuf, String)> = Vec::new();

    if includes.is_empty() {
        for file in walk_files(&paths.userdata, &ExclusionRules::userdata(include_addon_data)) {
            userdata_files.push((file.path, slash_path(&file.relative_path)));
        }
    } else {
        for item in includes {
            collect_include(paths, item, &mut userdata_files);
        }
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let userdata = userdata_files
        .into_iter()
        .map(|(source, rel)| (source, format!("userdata/{}", rel)));
    let addons = walk_files(&paths.addons, &ExclusionRules::addons())
        .into_iter()
        .map(|file| (file.path, format!("addons/{}", slash_path(&file.relative_path))));

    for (source, archive_path) in userdata.chain(addons) {
        if seen.insert(archive_path.clone()) {
            entries.push(ArchiveEntry {
                source,
                archive_path,
            });
        }
    }
    entries
}

fn collect_include(paths: &LocalPaths, item: &BackupInclude, out: &mut Vec<(PathBuf, String)>) {
    let (base, prefix) = match item.base {
        IncludeBase::Userdata => (paths.userdata.clone(), ""),
        IncludeBase::AddonData => (paths.addon_data(), "addon_data/"),
    };

    if let Some(file) = &item.file {
        let rel = format!("{}{}", prefix, file.replace('\\', "/"));
        if !is_allowed_entry(&format!("userdata/{}", rel)) {
            warn!("Backup include {} leaves userdata, ignored", file);
            return;
        }
        let source = base.join(file);
        if source.is_file() {
            out.push((source, rel));
        } else {
            debug!("Backup include {} not found", source.display());
        }
    } else if let Some(folder) = &item.folder {
        let root = base.join(folder);
        for file in walk_files(&root, &ExclusionRules::userdata(true)) {
            let rel = match file.path.strip_prefix(&paths.userdata) {
                Ok(rel) => slash_path(rel),
                Err(_) => {
                    warn!("Backup include {} is outside userdata, ignored", file.path.display());
                    continue;
                }
            };
            if !is_allowed_entry(&format!("userdata/{}", rel)) {
                warn!("Backup include {} leaves userdata, ignored", file.path.display());
                continue;
            }
            out.push((file.path, rel));
        }
    }
}

/// Write a backup archive into `target_dir` and return its path.
///
/// `cancel` is polled before each entry; on cancellation or any archive error the partial file is
/// removed. Unreadable source files are skipped with an error log.
pub fn create_backup(
    entries: &[ArchiveEntry],
    target_dir: &Path,
    creator: &str,
    cancel: CancelCheck<'_>,
) -> Result<PathBuf> {
    if entries.is_empty() {
        return Err(SyncError::ConfigurationIncomplete(
            "nothing to back up".to_string(),
        ));
    }

    fs::create_dir_all(target_dir)?;
    let zip_path = target_dir.join(backup_file_name(Local::now()));

    match write_backup(&zip_path, entries, creator, cancel) {
        Ok(written) => {
            let size = fs::metadata(&zip_path).map(|m| m.len()).unwrap_or(0);
            info!(
                "Backup written to {} ({} of {} files, {} bytes)",
                zip_path.display(),
                written,
                entries.len(),
                size
            );
            Ok(zip_path)
        }
        Err(e) => {
            if let Err(rm_err) = fs::remove_file(&zip_path) {
                debug!("Could not remove partial backup {}: {}", zip_path.display(), rm_err);
            }
            Err(e)
        }
    }
}

fn write_backup(
    zip_path: &Path,
    entries: &[ArchiveEntry],
    creator: &str,
    cancel: CancelCheck<'_>,
) -> Result<usize> {
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let mut written = 0;

    for entry in entries {
        if cancel() {
            info!("Backup cancelled after {} files", written);
            return Err(SyncError::Cancelled);
        }

        // read fully first so an unreadable source never leaves a truncated entry behind
        let content = match fs::read(&entry.source) {
            Ok(content) => content,
            Err(e) => {
                error!("Skip {}: {}", entry.archive_path, e);
                continue;
            }
        };

        zip.start_file(entry.archive_path.as_str(), entry_options())?;
        zip.write_all(&content)?;
        written += 1;
    }

    zip.start_file(MANIFEST_FILE_NAME, entry_options())?;
    zip.write_all(BackupManifest::new(creator).to_json()?.as_bytes())?;
    zip.finish()?;
    Ok(written)
}
