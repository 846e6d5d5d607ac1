//! Remote store access over FTP, SFTP and SMB.
//!
//! Every backend exposes the same byte-stream file semantics. Each call opens a session,
//! authenticates, performs one operation and closes again; no connection state survives between
//! calls, so a stale or broken session can never leak into the next operation.

pub mod ftp;
pub mod path;
pub mod profile;
pub mod sftp;
pub mod smb;

#[cfg(test)]
pub(crate) mod memory;

pub use path::RemotePath;
pub use profile::{ConnectionProfile, ProfileSlot};

use crate::settings::SettingsSource;
use crate::utils::errors::{Result, SyncError};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Ftp,
    Sftp,
    Smb,
}

impl ProtocolKind {
    /// Stored enum value: 0 = FTP, 1 = SFTP, 2 = SMB. Unknown values fall back to FTP.
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => ProtocolKind::Sftp,
            2 => ProtocolKind::Smb,
            _ => ProtocolKind::Ftp,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolKind::Ftp => "FTP",
            ProtocolKind::Sftp => "SFTP",
            ProtocolKind::Smb => "SMB",
        };
        f.write_str(name)
    }
}

/// Capability set shared by all protocol variants.
///
/// Failures are logged by the backend and surface as `Err` / `false` / empty lists; nothing
/// panics or propagates a protocol error type to the caller.
pub trait TransportBackend: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// Transfer a local file to `remote_path`. Parent directories are not created.
    fn upload(&self, local_path: &Path, remote_path: &RemotePath) -> Result<()>;

    /// Fetch `remote_path` into `local_path`. On error the local file may be absent or partial.
    fn download(&self, remote_path: &RemotePath, local_path: &Path) -> Result<()>;

    /// Best effort: "not found" and "permission denied" both read as absent.
    fn folder_exists(&self, remote_path: &RemotePath) -> bool;

    /// Create `remote_path` and every missing ancestor, top down. Returns the post-condition
    /// (`folder_exists`), so a concurrent creator does not count as failure.
    fn ensure_folder(&self, remote_path: &RemotePath) -> bool;

    /// Child names (files and directories). Empty on any error.
    fn list_directory(&self, remote_path: &RemotePath) -> Vec<String>;
}

/// Build the backend for a resolved profile.
pub fn backend_for(profile: &ConnectionProfile) -> Arc<dyn TransportBackend> {
    match profile.kind {
        ProtocolKind::Ftp => Arc::new(ftp::FtpBackend::new(profile)),
        ProtocolKind::Sftp => Arc::new(sftp::SftpBackend::new(profile)),
        ProtocolKind::Smb => {
            if !smb::SUPPORTED {
                warn!(
                    "Connection to {} uses SMB, but this build has no SMB client; rebuild with `--features smb` (needs libsmbclient)",
                    profile.host
                );
            }
            Arc::new(smb::SmbBackend::new(profile))
        }
    }
}

/// Backend for an explicit slot, or `None` when that slot has no host.
pub fn backend_for_slot(
    settings: &dyn SettingsSource,
    slot: ProfileSlot,
) -> Option<(ConnectionProfile, Arc<dyn TransportBackend>)> {
    let profile = ConnectionProfile::from_slot(settings, slot);
    if !profile.is_configured() {
        return None;
    }
    let backend = backend_for(&profile);
    Some((profile, backend))
}

/// Check a slot by looking up its base path.
pub fn test_connection(settings: &dyn SettingsSource, slot: ProfileSlot) -> Result<()> {
    let Some((profile, backend)) = backend_for_slot(settings, slot) else {
        return Err(SyncError::ConfigurationIncomplete(format!(
            "connection {} has no host",
            slot.number()
        )));
    };

    let base = RemotePath::base(&profile.base_path);
    if backend.folder_exists(&base) {
        info!(
            "Connection {} ({} {}) reachable, base path {} present",
            slot.number(),
            profile.kind,
            profile.host,
            base
        );
        Ok(())
    } else {
        error!(
            "Connection {} ({} {}) failed: base path {} not reachable",
            slot.number(),
            profile.kind,
            profile.host,
            base
        );
        Err(SyncError::RemoteUnavailable(format!(
            "{} {}: base path {} not reachable",
            profile.kind, profile.host, base
        )))
    }
}

/// Map a protocol failure into the taxonomy, logging it once.
pub(crate) fn remote_failure(kind: ProtocolKind, operation: &str, target: &str, err: impl fmt::Display) -> SyncError {
    error!("{} {} failed for {}: {}", kind, operation, target, err);
    SyncError::RemoteUnavailable(format!("{} {} {}: {}", kind, operation, target, err))
}
