//! SFTP backend over an SSH session with password authentication.

use super::{remote_failure, ConnectionProfile, ProtocolKind, RemotePath, TransportBackend};
use crate::utils::errors::Result;
use ssh2::{ErrorCode, Session, Sftp};
use std::fs::File;
use std::net::TcpStream;
use std::path::Path;
use tracing::{debug, warn};

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;

pub struct SftpBackend {
    host: String,
    port: u16,
    user: String,
    password: String,
}

/// One authenticated SFTP channel. Field order matters: the channel drops before its session.
struct SftpConnection {
    sftp: Sftp,
    _session: Session,
}

impl SftpBackend {
    pub fn new(profile: &ConnectionProfile) -> Self {
        Self {
            host: profile.host.trim().to_string(),
            port: profile.sftp_port,
            user: profile.user.clone(),
            password: profile.password.clone(),
        }
    }

    fn connect(&self) -> std::result::Result<SftpConnection, String> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| e.to_string())?;
        let mut sess = Session::new().map_err(|e| e.to_string())?;
        sess.set_tcp_stream(tcp);
        sess.handshake().map_err(|e| e.to_string())?;

        sess.userauth_password(&self.user, &self.password)
            .map_err(|e| format!("SSH authentication failed: {}", e))?;
        if !sess.authenticated() {
            return Err("SSH authentication failed".to_string());
        }

        let sftp = sess.sftp().map_err(|e| e.to_string())?;
        Ok(SftpConnection {
            sftp,
            _session: sess,
        })
    }

    fn session(&self, operation: &str, target: &str) -> Result<SftpConnection> {
        self.connect()
            .map_err(|e| remote_failure(ProtocolKind::Sftp, operation, target, e))
    }
}

fn sftp_code(err: &ssh2::Error) -> Option<i32> {
    match err.code() {
        ErrorCode::SFTP(code) => Some(code),
        ErrorCode::Session(_) => None,
    }
}

/// Directory check on an open channel. Permission denied reads as absent.
fn is_dir(sftp: &Sftp, path: &str) -> bool {
    match sftp.stat(Path::new(path)) {
        Ok(stat) => stat.is_dir(),
        Err(e) => {
            match sftp_code(&e) {
                Some(FX_NO_SUCH_FILE) => debug!("SFTP folder {} not found", path),
                Some(FX_PERMISSION_DENIED) => {
                    warn!("SFTP permission denied on {}, treating as absent", path)
                }
                _ => warn!("SFTP stat failed for {}: {}", path, e),
            }
            false
        }
    }
}

impl TransportBackend for SftpBackend {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Sftp
    }

    fn upload(&self, local_path: &Path, remote_path: &RemotePath) -> Result<()> {
        let mut source = File::open(local_path)?;
        let target = remote_path.as_absolute();
        let conn = self.session("upload", &target)?;

        let mut remote = conn
            .sftp
            .create(Path::new(&target))
            .map_err(|e| remote_failure(ProtocolKind::Sftp, "upload", &target, e))?;
        std::io::copy(&mut source, &mut remote)
            .map_err(|e| remote_failure(ProtocolKind::Sftp, "upload", &target, e))?;

        debug!("SFTP uploaded {} -> {}", local_path.display(), target);
        Ok(())
    }

    fn download(&self, remote_path: &RemotePath, local_path: &Path) -> Result<()> {
        let source = remote_path.as_absolute();
        let conn = self.session("download", &source)?;

        let mut remote = conn
            .sftp
            .open(Path::new(&source))
            .map_err(|e| remote_failure(ProtocolKind::Sftp, "download", &source, e))?;
        let mut local = File::create(local_path)?;
        std::io::copy(&mut remote, &mut local)
            .map_err(|e| remote_failure(ProtocolKind::Sftp, "download", &source, e))?;

        Ok(())
    }

    fn folder_exists(&self, remote_path: &RemotePath) -> bool {
        let target = remote_path.as_absolute();
        match self.session("stat", &target) {
            Ok(conn) => is_dir(&conn.sftp, &target),
            Err(_) => false,
        }
    }

    fn ensure_folder(&self, remote_path: &RemotePath) -> bool {
        let target = remote_path.as_absolute();
        let Ok(conn) = self.session("mkdir", &target) else {
            return false;
        };

        for ancestor in remote_path.ancestors_top_down() {
            let dir = ancestor.as_absolute();
            match conn.sftp.stat(Path::new(&dir)) {
                Ok(_) => continue,
                Err(e) if sftp_code(&e) == Some(FX_NO_SUCH_FILE) => {
                    if let Err(mkdir_err) = conn.sftp.mkdir(Path::new(&dir), 0o755) {
                        warn!("SFTP mkdir failed for {}: {}", dir, mkdir_err);
                        break;
                    }
                }
                Err(e) => {
                    warn!("SFTP ensure_folder stopped at {}: {}", dir, e);
                    break;
                }
            }
        }

        is_dir(&conn.sftp, &target)
    }

    fn list_directory(&self, remote_path: &RemotePath) -> Vec<String> {
        let target = remote_path.as_absolute();
        let Ok(conn) = self.session("list", &target) else {
            return Vec::new();
        };

        match conn.sftp.readdir(Path::new(&target)) {
            Ok(entries) => entries
                .into_iter()
                .filter_map(|(path, _)| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().to_string())
                })
                .collect(),
            Err(e) => {
                debug!("SFTP list failed for {}: {}", target, e);
                Vec::new()
            }
        }
    }
}
