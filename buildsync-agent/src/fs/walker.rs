//! Directory traversal with exclusion rules.
//!
//! Excluded directories are pruned (never descended into), excluded files are skipped. Unreadable
//! entries are logged and skipped so a single bad file never aborts a backup scan.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Transient folders never worth backing up.
pub const TRANSIENT_DIRS: &[&str] = &["cache", "temp", "packages", "archive_cache"];

/// Log files rewritten on every start.
pub const TRANSIENT_FILES: &[&str] = &[
    "kodi.log",
    "kodi.old.log",
    "xbmc.log",
    "xbmc.old.log",
    ".DS_Store",
];

/// Which entries a walk leaves out.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    /// Directory names pruned anywhere below the root
    pub dirs: Vec<String>,

    /// Exact file names skipped
    pub files: Vec<String>,

    /// Skip AppleDouble (`._*`) files
    pub skip_apple_double: bool,

    /// Skip compiled `*.pyo` files
    pub skip_pyo: bool,
}

impl ExclusionRules {
    /// Userdata defaults: transient folders, log files, macOS metadata and `.pyo` files.
    pub fn userdata(include_addon_data: bool) -> Self {
        let mut dirs: Vec<String> = TRANSIENT_DIRS.iter().map(|d| d.to_string()).collect();
        if !include_addon_data {
            dirs.push("addon_data".to_string());
        }
        Self {
            dirs,
            ..Self::files_only()
        }
    }

    /// Addons tree: only the package cache is pruned.
    pub fn addons() -> Self {
        Self {
            dirs: vec!["packages".to_string()],
            ..Self::files_only()
        }
    }

    /// File rules shared by every tree.
    fn files_only() -> Self {
        Self {
            dirs: Vec::new(),
            files: TRANSIENT_FILES.iter().map(|f| f.to_string()).collect(),
            skip_apple_double: true,
            skip_pyo: true,
        }
    }

    pub fn excludes_dir(&self, name: &str) -> bool {
        self.dirs.iter().any(|d| d == name)
    }

    pub fn excludes_file(&self, name: &str) -> bool {
        if self.files.iter().any(|f| f == name) {
            return true;
        }
        if self.skip_apple_double && name.starts_with("._") {
            return true;
        }
        self.skip_pyo && name.to_ascii_lowercase().ends_with(".pyo")
    }
}

/// A regular file found during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the walk root
    pub relative_path: PathBuf,
}

/// Walk `root` and collect every regular file not excluded by `rules`.
///
/// A missing root yields an empty list. Symlinks are not followed into directories; a symlink to
/// a regular file is included.
pub fn walk_files(root: &Path, rules: &ExclusionRules) -> Vec<WalkedFile> {
    let mut files = Vec::new();
    if !root.is_dir() {
        debug!("Walk root {} is not a directory", root.display());
        return files;
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_pruned(entry, rules));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !is_regular_file(&entry) {
            continue;
        }
        if rules.excludes_file(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        files.push(WalkedFile {
            path,
            relative_path,
        });
    }

    files
}

fn is_pruned(entry: &DirEntry, rules: &ExclusionRules) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && rules.excludes_dir(&entry.file_name().to_string_lossy())
}

/// Regular files, and symlinks that resolve to one. Broken links and links to directories are skipped.
fn is_regular_file(entry: &DirEntry) -> bool {
    if entry.file_type().is_file() {
        return true;
    }
    entry.path_is_symlink()
        && std::fs::metadata(entry.path())
            .map(|m| m.is_file())
            .unwrap_or(false)
}
