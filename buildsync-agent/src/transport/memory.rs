//! In-memory backend for tests. Records every call and can simulate an unreachable server.

use super::{ProtocolKind, RemotePath, TransportBackend};
use crate::utils::errors::{Result, SyncError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    folders: HashSet<String>,
    calls: Vec<String>,
    offline: bool,
    deny_mkdir: bool,
}

#[derive(Default)]
pub(crate) struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a folder and all its ancestors.
    pub(crate) fn with_folder(self, path: &RemotePath) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for ancestor in path.ancestors_top_down() {
                state.folders.insert(ancestor.as_absolute());
            }
        }
        self
    }

    pub(crate) fn put_file(&self, path: &RemotePath, content: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.as_absolute(), content.to_vec());
    }

    pub(crate) fn file(&self, path: &RemotePath) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(&path.as_absolute()).cloned()
    }

    pub(crate) fn has_folder(&self, path: &RemotePath) -> bool {
        self.state.lock().unwrap().folders.contains(&path.as_absolute())
    }

    /// Operation names in call order, e.g. `"mkdir /a/b"`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub(crate) fn set_deny_mkdir(&self, deny: bool) {
        self.state.lock().unwrap().deny_mkdir = deny;
    }

    fn record(&self, op: &str, path: &RemotePath) -> bool {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", op, path.as_absolute()));
        !state.offline
    }

    fn parent_exists(state: &State, path: &RemotePath) -> bool {
        let segments = path.segments();
        if segments.len() <= 1 {
            return true;
        }
        state
            .folders
            .contains(&format!("/{}", segments[..segments.len() - 1].join("/")))
    }
}

impl TransportBackend for MemoryBackend {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ftp
    }

    fn upload(&self, local_path: &Path, remote_path: &RemotePath) -> Result<()> {
        if !self.record("upload", remote_path) {
            return Err(SyncError::RemoteUnavailable("offline".into()));
        }
        let content = std::fs::read(local_path)?;
        let mut state = self.state.lock().unwrap();
        if !Self::parent_exists(&state, remote_path) {
            return Err(SyncError::RemoteUnavailable(format!(
                "no parent folder for {}",
                remote_path
            )));
        }
        state.files.insert(remote_path.as_absolute(), content);
        Ok(())
    }

    fn download(&self, remote_path: &RemotePath, local_path: &Path) -> Result<()> {
        if !self.record("download", remote_path) {
            return Err(SyncError::RemoteUnavailable("offline".into()));
        }
        let content = self
            .file(remote_path)
            .ok_or_else(|| SyncError::RemoteUnavailable(format!("{} not found", remote_path)))?;
        std::fs::write(local_path, content)?;
        Ok(())
    }

    fn folder_exists(&self, remote_path: &RemotePath) -> bool {
        self.record("stat", remote_path) && self.has_folder(remote_path)
    }

    fn ensure_folder(&self, remote_path: &RemotePath) -> bool {
        for ancestor in remote_path.ancestors_top_down() {
            if !self.record("mkdir", &ancestor) {
                return false;
            }
            let mut state = self.state.lock().unwrap();
            if state.folders.contains(&ancestor.as_absolute()) {
                continue;
            }
            if state.deny_mkdir {
                break;
            }
            state.folders.insert(ancestor.as_absolute());
        }
        self.folder_exists(remote_path)
    }

    fn list_directory(&self, remote_path: &RemotePath) -> Vec<String> {
        if !self.record("list", remote_path) {
            return Vec::new();
        }
        let prefix = format!("{}/", remote_path.as_absolute());
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .files
            .keys()
            .chain(state.folders.iter())
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }
}
