//! SMB backend. The first segment of a remote path names the share.
//!
//! The protocol client is libsmbclient (through `pavao`), compiled in with the `smb` feature.
//! Without it every operation fails as "remote unavailable".

use super::{remote_failure, ConnectionProfile, ProtocolKind, RemotePath, TransportBackend};
use crate::utils::errors::{Result, SyncError};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Whether this build carries an SMB client.
pub const SUPPORTED: bool = cfg!(feature = "smb");

pub struct SmbBackend {
    host: String,
    user: String,
    password: String,
}

impl SmbBackend {
    pub fn new(profile: &ConnectionProfile) -> Self {
        Self {
            host: profile.host.trim().to_string(),
            user: profile.user.clone(),
            password: profile.password.clone(),
        }
    }

    fn client(&self, share: &str, operation: &str, target: &RemotePath) -> Result<imp::Client> {
        imp::connect(&self.host, share, &self.user, &self.password)
            .map_err(|e| remote_failure(ProtocolKind::Smb, operation, &target.to_string(), e))
    }
}

/// Split `/share/a/b` into (`/share`, `/a/b`).
fn split_share(remote_path: &RemotePath) -> Result<(String, String)> {
    let segments = remote_path.segments();
    let Some((share, rest)) = segments.split_first() else {
        return Err(SyncError::InvalidRemotePath(
            "SMB paths must start with a share name".to_string(),
        ));
    };
    Ok((format!("/{}", share), format!("/{}", rest.join("/"))))
}

impl TransportBackend for SmbBackend {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Smb
    }

    fn upload(&self, local_path: &Path, remote_path: &RemotePath) -> Result<()> {
        let (share, path) = split_share(remote_path)?;
        let mut source = File::open(local_path)?;
        let client = self.client(&share, "upload", remote_path)?;

        imp::write_file(&client, &path, &mut source)
            .map_err(|e| remote_failure(ProtocolKind::Smb, "upload", &remote_path.to_string(), e))
    }

    fn download(&self, remote_path: &RemotePath, local_path: &Path) -> Result<()> {
        let (share, path) = split_share(remote_path)?;
        let client = self.client(&share, "download", remote_path)?;
        let mut local = File::create(local_path)?;

        imp::read_file(&client, &path, &mut local)
            .map_err(|e| remote_failure(ProtocolKind::Smb, "download", &remote_path.to_string(), e))
    }

    fn folder_exists(&self, remote_path: &RemotePath) -> bool {
        let Ok((share, path)) = split_share(remote_path) else {
            return false;
        };
        match self.client(&share, "stat", remote_path) {
            Ok(client) => imp::is_dir(&client, &path),
            Err(_) => false,
        }
    }

    fn ensure_folder(&self, remote_path: &RemotePath) -> bool {
        let Ok((share, _)) = split_share(remote_path) else {
            return false;
        };
        let Ok(client) = self.client(&share, "mkdir", remote_path) else {
            return false;
        };

        // The share itself cannot be created; walk the folders beneath it.
        for ancestor in remote_path.ancestors_top_down().skip(1) {
            let Ok((_, dir)) = split_share(&ancestor) else {
                break;
            };
            if imp::is_dir(&client, &dir) {
                continue;
            }
            if let Err(e) = imp::mkdir(&client, &dir) {
                warn!("SMB mkdir failed for {}{}: {}", share, dir, e);
                break;
            }
        }

        let (_, path) = match split_share(remote_path) {
            Ok(parts) => parts,
            Err(_) => return false,
        };
        imp::is_dir(&client, &path)
    }

    fn list_directory(&self, remote_path: &RemotePath) -> Vec<String> {
        let Ok((share, path)) = split_share(remote_path) else {
            return Vec::new();
        };
        let Ok(client) = self.client(&share, "list", remote_path) else {
            return Vec::new();
        };

        imp::list(&client, &path).unwrap_or_else(|e| {
            debug!("SMB list failed for {}: {}", remote_path, e);
            Vec::new()
        })
    }
}

#[cfg(feature = "smb")]
mod imp {
    use pavao::{SmbClient, SmbCredentials, SmbMode, SmbOpenOptions, SmbOptions};
    use std::io::{Read, Write};

    pub(super) type Client = SmbClient;

    pub(super) fn connect(host: &str, share: &str, user: &str, password: &str) -> Result<Client, String> {
        SmbClient::new(
            SmbCredentials::default()
                .server(format!("smb://{}", host))
                .share(share)
                .username(user)
                .password(password),
            SmbOptions::default().one_share_per_server(true),
        )
        .map_err(|e| e.to_string())
    }

    pub(super) fn write_file(client: &Client, path: &str, source: &mut impl Read) -> Result<(), String> {
        let mut file = client
            .open_with(
                path,
                SmbOpenOptions::default().create(true).write(true).truncate(true),
            )
            .map_err(|e| e.to_string())?;
        std::io::copy(source, &mut file).map_err(|e| e.to_string())?;
        file.flush().map_err(|e| e.to_string())
    }

    pub(super) fn read_file(client: &Client, path: &str, target: &mut impl Write) -> Result<(), String> {
        let mut file = client
            .open_with(path, SmbOpenOptions::default().read(true))
            .map_err(|e| e.to_string())?;
        std::io::copy(&mut file, target).map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Permission errors read as absent but are logged at warn.
    pub(super) fn is_dir(client: &Client, path: &str) -> bool {
        match client.list_dir(path) {
            Ok(_) => true,
            Err(e) => {
                let message = e.to_string();
                if message.to_ascii_lowercase().contains("denied") {
                    tracing::warn!("SMB permission denied on {}, treating as absent: {}", path, message);
                } else {
                    tracing::debug!("SMB folder {} not available: {}", path, message);
                }
                false
            }
        }
    }

    pub(super) fn mkdir(client: &Client, path: &str) -> Result<(), String> {
        client
            .mkdir(path, SmbMode::from(0o755))
            .map_err(|e| e.to_string())
    }

    pub(super) fn list(client: &Client, path: &str) -> Result<Vec<String>, String> {
        let entries = client.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries
            .iter()
            .map(|entry| entry.name().to_string())
            .filter(|name| name != "." && name != "..")
            .collect())
    }
}

#[cfg(not(feature = "smb"))]
mod imp {
    use std::io::{Read, Write};

    /// No client exists without the `smb` feature.
    pub(super) enum Client {}

    pub(super) fn connect(_host: &str, _share: &str, _user: &str, _password: &str) -> Result<Client, String> {
        Err("built without SMB support; rebuild with `--features smb` (needs libsmbclient)".to_string())
    }

    pub(super) fn write_file(client: &Client, _path: &str, _source: &mut impl Read) -> Result<(), String> {
        match *client {}
    }

    pub(super) fn read_file(client: &Client, _path: &str, _target: &mut impl Write) -> Result<(), String> {
        match *client {}
    }

    pub(super) fn is_dir(client: &Client, _path: &str) -> bool {
        match *client {}
    }

    pub(super) fn mkdir(client: &Client, _path: &str) -> Result<(), String> {
        match *client {}
    }

    pub(super) fn list(client: &Client, _path: &str) -> Result<Vec<String>, String> {
        match *client {}
    }
}
