//! Provenance manifest embedded in every backup archive.
//!
//! The manifest is a single JSON entry recording who built the archive and with which schema
//! version. A restore trusts an archive only when both match exactly.

use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};

/// Entry name inside the archive.
pub const MANIFEST_FILE_NAME: &str = "doku_backup_manifest.json";

/// Current archive schema.
pub const MANIFEST_VERSION: u32 = 1;

/// Backup manifest, serialized as `doku_backup_manifest.json` at the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub creator: String,
    pub version: u32,
    /// Local creation time, ISO-8601
    pub timestamp: String,
}

impl BackupManifest {
    pub fn new(creator: &str) -> Self {
        Self {
            creator: creator.to_string(),
            version: MANIFEST_VERSION,
            timestamp: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Exact match on creator and schema version.
    pub fn is_trusted(&self, creator: &str) -> bool {
        self.creator == creator && self.version == MANIFEST_VERSION
    }
}
