//! FTP backend (plain FTP, binary transfers).

use super::{remote_failure, ConnectionProfile, ProtocolKind, RemotePath, TransportBackend};
use crate::utils::errors::Result;
use std::fs::File;
use std::path::Path;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tracing::{debug, warn};

const DEFAULT_FTP_PORT: u16 = 21;

pub struct FtpBackend {
    address: String,
    user: String,
    password: String,
}

impl FtpBackend {
    pub fn new(profile: &ConnectionProfile) -> Self {
        let host = profile.host.trim();
        let address = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, DEFAULT_FTP_PORT)
        };
        let user = if profile.user.trim().is_empty() {
            "anonymous".to_string()
        } else {
            profile.user.clone()
        };

        Self {
            address,
            user,
            password: profile.password.clone(),
        }
    }

    /// Connect and log in. Every operation gets a fresh session.
    fn connect(&self) -> std::result::Result<FtpStream, FtpError> {
        let mut ftp = FtpStream::connect(&self.address)?;
        ftp.login(self.user.as_str(), self.password.as_str())?;
        Ok(ftp)
    }

    fn with_session<T>(
        &self,
        op: impl FnOnce(&mut FtpStream) -> std::result::Result<T, FtpError>,
    ) -> std::result::Result<T, FtpError> {
        let mut ftp = self.connect()?;
        let result = op(&mut ftp);
        let _ = ftp.quit();
        result
    }
}

/// 550: requested action not taken (missing, or not accessible).
fn is_unavailable(err: &FtpError) -> bool {
    matches!(err, FtpError::UnexpectedResponse(resp) if matches!(resp.status, Status::FileUnavailable))
}

impl TransportBackend for FtpBackend {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ftp
    }

    fn upload(&self, local_path: &Path, remote_path: &RemotePath) -> Result<()> {
        let mut file = File::open(local_path)?;
        let target = remote_path.as_absolute();

        self.with_session(|ftp| {
            ftp.transfer_type(FileType::Binary)?;
            ftp.put_file(&target, &mut file)
        })
        .map(|bytes| debug!("FTP stored {} bytes at {}", bytes, target))
        .map_err(|e| remote_failure(ProtocolKind::Ftp, "upload", &target, e))
    }

    fn download(&self, remote_path: &RemotePath, local_path: &Path) -> Result<()> {
        let source = remote_path.as_absolute();

        let buffer = self
            .with_session(|ftp| {
                ftp.transfer_type(FileType::Binary)?;
                ftp.retr_as_buffer(&source)
            })
            .map_err(|e| remote_failure(ProtocolKind::Ftp, "download", &source, e))?;

        std::fs::write(local_path, buffer.into_inner())?;
        Ok(())
    }

    fn folder_exists(&self, remote_path: &RemotePath) -> bool {
        let target = remote_path.as_absolute();
        match self.with_session(|ftp| ftp.cwd(&target)) {
            Ok(()) => true,
            Err(e) if is_unavailable(&e) => {
                debug!("FTP folder {} not available: {}", target, e);
                false
            }
            Err(e) => {
                warn!("FTP folder check failed for {}: {}", target, e);
                false
            }
        }
    }

    fn ensure_folder(&self, remote_path: &RemotePath) -> bool {
        if remote_path.is_root() {
            return self.folder_exists(remote_path);
        }

        let walk = self.with_session(|ftp| {
            for ancestor in remote_path.ancestors_top_down() {
                let dir = ancestor.as_absolute();
                match ftp.cwd(&dir) {
                    Ok(()) => continue,
                    Err(e) if is_unavailable(&e) => {
                        if let Err(mkd_err) = ftp.mkdir(&dir) {
                            warn!("FTP mkdir failed for {}: {}", dir, mkd_err);
                            break;
                        }
                        ftp.cwd(&dir)?;
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        });

        if let Err(e) = walk {
            warn!("FTP ensure_folder failed for {}: {}", remote_path, e);
        }
        self.folder_exists(remote_path)
    }

    fn list_directory(&self, remote_path: &RemotePath) -> Vec<String> {
        let target = remote_path.as_absolute();
        match self.with_session(|ftp| {
            ftp.cwd(&target)?;
            ftp.nlst(None)
        }) {
            Ok(names) => names
                .into_iter()
                .filter_map(|n| n.rsplit('/').next().map(str::to_string))
                .filter(|n| !n.is_empty() && n != "." && n != "..")
                .collect(),
            Err(e) => {
                debug!("FTP list failed for {}: {}", target, e);
                Vec::new()
            }
        }
    }
}
