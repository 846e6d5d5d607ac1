//! ZIP snapshots: full backups with a provenance manifest, and plain directory archives for
//! addon-data sync.
//!
//! Backup archives only ever contain entries under `userdata/` and `addons/`, plus the manifest.
//! Restores validate first and then re-check every entry before extraction.

pub mod backup;
pub mod data;
pub mod manifest;
pub mod policy;
pub mod restore;

pub use backup::{backup_file_name, collect_backup_entries, create_backup, BACKUP_PREFIX};
pub use data::{extract_directory, zip_directory};
pub use manifest::{BackupManifest, MANIFEST_FILE_NAME, MANIFEST_VERSION};
pub use restore::{
    is_valid_backup, list_local_backups, restore_from_zip, select_remote_backups, validate_backup,
    RestoreOptions,
};

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// One file to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    /// Forward-slash name inside the archive
    pub archive_path: String,
}

/// Per-entry outcome counts of an extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub extracted: usize,
    /// Rejected by policy (allow-list, self-exclusion, containment)
    pub skipped: usize,
    pub failed: usize,
}

/// Cooperative cancellation check, polled before each entry. `true` aborts.
pub type CancelCheck<'a> = &'a dyn Fn() -> bool;

/// Never cancels.
pub fn no_cancel() -> bool {
    false
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true)
}

/// `a/b/c` with forward slashes, whatever the host separator.
fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write one archive member to `target`, creating parent directories below `root`.
///
/// `Ok(None)` when a symlink already on disk would carry the write outside `root`; nothing is
/// created in that case.
fn extract_entry(entry: &mut impl io::Read, root: &Path, target: &Path) -> io::Result<Option<u64>> {
    let root = root.canonicalize()?;
    let Some(parent) = target.parent() else {
        return Ok(None);
    };

    // the existing part of the path decides where create_dir_all would actually write
    let existing = parent.ancestors().find(|p| p.exists()).unwrap_or(parent);
    if !existing.canonicalize()?.starts_with(&root) {
        return Ok(None);
    }
    std::fs::create_dir_all(parent)?;
    if !parent.canonicalize()?.starts_with(&root) {
        return Ok(None);
    }
    if std::fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        return Ok(None);
    }

    let mut out = File::create(target)?;
    io::copy(entry, &mut out).map(Some)
}
