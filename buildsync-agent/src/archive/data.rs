//! Plain directory archives used to ship `addon_data` between systems.

use super::policy::{contained_target, is_directory_entry};
use super::{entry_options, extract_entry, slash_path, RestoreReport};
use crate::fs::walker::{walk_files, ExclusionRules};
use crate::utils::errors::{Result, SyncError};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, error, info, warn};
use zip::{ZipArchive, ZipWriter};

/// Zip every file under `source` with names relative to it. Returns the number of files stored.
/// A failed archive is removed.
pub fn zip_directory(source: &Path, zip_path: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(SyncError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", source.display()),
        )));
    }

    match write_directory_zip(source, zip_path) {
        Ok(stored) => {
            info!("Zipped {} files from {} into {}", stored, source.display(), zip_path.display());
            Ok(stored)
        }
        Err(e) => {
            error!("Creating {} failed: {}", zip_path.display(), e);
            if let Err(rm_err) = fs::remove_file(zip_path) {
                debug!("Could not remove {}: {}", zip_path.display(), rm_err);
            }
            Err(e)
        }
    }
}

fn write_directory_zip(source: &Path, zip_path: &Path) -> Result<usize> {
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let mut stored = 0;
    for file in walk_files(source, &ExclusionRules::default()) {
        let mut input = match File::open(&file.path) {
            Ok(input) => input,
            Err(e) => {
                warn!("Skip {}: {}", file.path.display(), e);
                continue;
            }
        };
        zip.start_file(slash_path(&file.relative_path), entry_options())?;
        io::copy(&mut input, &mut zip)?;
        stored += 1;
    }
    zip.finish()?;
    Ok(stored)
}

/// Extract `zip_path` into `target`. Entries that would land outside `target` are skipped.
pub fn extract_directory(zip_path: &Path, target: &Path) -> Result<RestoreReport> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let mut report = RestoreReport::default();
    fs::create_dir_all(target)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if entry.is_dir() || is_directory_entry(&name) {
            continue;
        }

        let Some(destination) = contained_target(target, &name) else {
            warn!("Skip entry escaping {}: {}", target.display(), name);
            report.skipped += 1;
            continue;
        };
        match extract_entry(&mut entry, target, &destination) {
            Ok(Some(_)) => report.extracted += 1,
            Ok(None) => {
                warn!("Skip entry leaving {} through a symlink: {}", target.display(), name);
                report.skipped += 1;
            }
            Err(e) => {
                error!("Extract error {}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Extracted {} into {} ({} files, {} skipped)",
        zip_path.display(),
        target.display(),
        report.extracted,
        report.skipped
    );
    Ok(report)
}
