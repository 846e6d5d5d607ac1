//! Connection profiles: stored settings resolved into something a backend can connect with.

use super::path::RemotePath;
use super::ProtocolKind;
use crate::settings::SettingsSource;
use std::fmt;

pub const DEFAULT_SFTP_PORT: u16 = 22;

/// One of the three stored connection slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSlot {
    One,
    Two,
    Three,
}

impl ProfileSlot {
    pub const ALL: [ProfileSlot; 3] = [ProfileSlot::One, ProfileSlot::Two, ProfileSlot::Three];

    /// `1..=3`; anything else (including 0 = "none") has no slot.
    pub fn from_setting(value: i64) -> Option<Self> {
        match value {
            1 => Some(ProfileSlot::One),
            2 => Some(ProfileSlot::Two),
            3 => Some(ProfileSlot::Three),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            ProfileSlot::One => 1,
            ProfileSlot::Two => 2,
            ProfileSlot::Three => 3,
        }
    }

    fn key(self, name: &str) -> String {
        format!("connection_{}_{}", self.number(), name)
    }
}

/// Immutable for the duration of one operation; re-read from settings for every run.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub kind: ProtocolKind,
    pub host: String,
    pub user: String,
    pub password: String,
    pub base_path: String,
    pub sftp_port: u16,
}

impl ConnectionProfile {
    /// "No host configured". Every remote operation is gated off for this profile.
    pub fn none() -> Self {
        Self {
            kind: ProtocolKind::Ftp,
            host: String::new(),
            user: String::new(),
            password: String::new(),
            base_path: String::new(),
            sftp_port: DEFAULT_SFTP_PORT,
        }
    }

    pub fn from_slot(settings: &dyn SettingsSource, slot: ProfileSlot) -> Self {
        let port = settings
            .get_string(&slot.key("sftp_port"), "22")
            .trim()
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_SFTP_PORT);

        Self {
            kind: ProtocolKind::from_index(settings.get_int(&slot.key("type"), 0)),
            host: settings.get_string(&slot.key("host"), "").trim().to_string(),
            user: settings.get_string(&slot.key("user"), ""),
            password: settings.get_string(&slot.key("password"), ""),
            base_path: settings.get_string(&slot.key("base_path"), "").trim().to_string(),
            sftp_port: port,
        }
    }

    /// Profile of `active_connection`; unknown or out-of-range slots resolve to [`Self::none`].
    pub fn active(settings: &dyn SettingsSource) -> Self {
        match ProfileSlot::from_setting(settings.get_int("active_connection", 1)) {
            Some(slot) => Self::from_slot(settings, slot),
            None => Self::none(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// `<base>/auto_fav_sync`
    pub fn sync_root(&self) -> RemotePath {
        RemotePath::sync_root(&self.base_path)
    }

    /// Human readable description without the password.
    pub fn summary(&self, label: &str) -> String {
        if !self.is_configured() {
            return format!("{}\n\nNot configured", label);
        }

        let mut lines = vec![
            label.to_string(),
            String::new(),
            format!("Type: {}", self.kind),
            format!("Host: {}", self.host),
            format!("User: {}", if self.user.trim().is_empty() { "-" } else { self.user.trim() }),
            format!("Base path: {}", if self.base_path.is_empty() { "." } else { &self.base_path }),
        ];
        if self.kind == ProtocolKind::Sftp {
            lines.push(format!("SFTP port: {}", self.sftp_port));
        }
        lines.join("\n")
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("base_path", &self.base_path)
            .field("sftp_port", &self.sftp_port)
            .finish()
    }
}
