//! Canonical remote paths.
//!
//! A remote path is the configured base path followed by sync components. Directory components
//! are lower-cased so the same layout matches on case-sensitive and case-insensitive servers; a
//! component containing a dot is treated as a file name and left untouched.

use crate::utils::errors::{Result, SyncError};
use std::fmt;

/// Top-level folder every sync artefact lives under.
pub const SYNC_ROOT_FOLDER: &str = "auto_fav_sync";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    /// The configured base path, taken verbatim. Backslashes count as separators.
    pub fn base(base_path: &str) -> Self {
        let segments = base_path
            .split(['/', '\\'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    /// `<base>/auto_fav_sync`
    pub fn sync_root(base_path: &str) -> Self {
        let mut path = Self::base(base_path);
        path.segments.push(SYNC_ROOT_FOLDER.to_string());
        path
    }

    /// Append a component (which may itself contain `/`). Empty components, `.` and `..` are rejected.
    pub fn join(&self, component: &str) -> Result<Self> {
        let trimmed = component.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(SyncError::InvalidRemotePath(format!(
                "empty component after {}",
                self
            )));
        }

        let mut segments = self.segments.clone();
        for segment in trimmed.split('/') {
            let segment = segment.trim();
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(SyncError::InvalidRemotePath(format!(
                    "invalid component '{}' in '{}'",
                    segment, component
                )));
            }
            segments.push(canonical_segment(segment));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last component, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Every ancestor from the top down, ending with `self`.
    pub fn ancestors_top_down(&self) -> impl Iterator<Item = RemotePath> + '_ {
        (1..=self.segments.len()).map(|n| RemotePath {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// `/a/b/c`
    pub fn as_absolute(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// `a/b/c`
    pub fn as_relative(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_absolute())
    }
}

fn canonical_segment(segment: &str) -> String {
    if segment.contains('.') {
        segment.to_string()
    } else {
        segment.to_lowercase()
    }
}
