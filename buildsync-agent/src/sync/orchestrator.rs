//! Sync cycle state machine.
//!
//! A cycle walks `Idle -> EnsureRemoteStructure -> SyncAddonData -> SyncFavourites -> Done`.
//! Cancellation is checked before every step; a step that cannot be recovered from (manual setup
//! required, cancelled) ends the cycle early. Other step failures are recorded and the cycle moves on.

use crate::archive;
use crate::config::{BackupInclude, Config};
use crate::favourites::{self, FavouritesDocument};
use crate::paths::{LocalPaths, ADDON_DATA_ARCHIVE, FAVOURITES_FILE};
use crate::settings::{FavouritesSyncMode, SyncConfiguration};
use crate::transport::{self, ConnectionProfile, RemotePath, TransportBackend};
use crate::utils::errors::{Result, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Position of a cycle in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Idle,
    EnsureRemoteStructure,
    SyncAddonData,
    SyncFavourites,
    Done,
}

impl CycleStep {
    fn next(self) -> Self {
        match self {
            CycleStep::Idle => CycleStep::EnsureRemoteStructure,
            CycleStep::EnsureRemoteStructure => CycleStep::SyncAddonData,
            CycleStep::SyncAddonData => CycleStep::SyncFavourites,
            CycleStep::SyncFavourites | CycleStep::Done => CycleStep::Done,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavouritesOutcome {
    /// No connection configured; only the local `.bak` was written
    LocalBackupOnly { bak: PathBuf },
    /// Main file synced. Static folders that failed are listed by name.
    Synced {
        remote: RemotePath,
        static_synced: usize,
        static_failed: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonDataOutcome {
    Skipped,
    Uploaded { remote: RemotePath, files: usize },
    Downloaded { remote: RemotePath, extracted: usize },
}

/// Aggregated result of one cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// Last step that was started (`Done` when the cycle ran to the end)
    pub reached: CycleStep,
    pub structure: Option<Result<()>>,
    pub addon_data: Option<Result<AddonDataOutcome>>,
    pub favourites: Option<Result<FavouritesOutcome>>,
    /// Set when the cycle ended early
    pub halted: Option<SyncError>,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            reached: CycleStep::Idle,
            structure: None,
            addon_data: None,
            favourites: None,
            halted: None,
        }
    }

    /// Ran to the end and no step failed.
    pub fn is_success(&self) -> bool {
        self.reached == CycleStep::Done
            && self.halted.is_none()
            && !matches!(self.structure, Some(Err(_)))
            && !matches!(self.addon_data, Some(Err(_)))
            && !matches!(self.favourites, Some(Err(_)))
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.halted, Some(SyncError::Cancelled))
    }
}

/// Runs sync operations against one immutable [`SyncConfiguration`].
pub struct SyncOrchestrator {
    pub(super) config: SyncConfiguration,
    pub(super) paths: LocalPaths,
    pub(super) addon_id: String,
    pub(super) includes: Vec<BackupInclude>,
    backend_override: Option<Arc<dyn TransportBackend>>,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfiguration, paths: LocalPaths, addon_id: &str) -> Self {
        Self {
            config,
            paths,
            addon_id: addon_id.to_string(),
            includes: Vec::new(),
            backend_override: None,
        }
    }

    /// Settings, paths and active inclusion entries from a loaded configuration file.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SyncConfiguration::load(&config.settings),
            LocalPaths::from_config(config),
            &config.agent.addon_id,
        )
        .with_includes(config.backup.active_includes(&config.settings))
    }

    /// Backup inclusion list; empty means the whole userdata tree.
    pub fn with_includes(mut self, includes: Vec<BackupInclude>) -> Self {
        self.includes = includes;
        self
    }

    /// Use `backend` for every connection instead of building one from the profile.
    pub fn with_backend(mut self, backend: Arc<dyn TransportBackend>) -> Self {
        self.backend_override = Some(backend);
        self
    }

    pub fn config(&self) -> &SyncConfiguration {
        &self.config
    }

    pub fn paths(&self) -> &LocalPaths {
        &self.paths
    }

    pub(super) fn backend(&self, profile: &ConnectionProfile) -> Arc<dyn TransportBackend> {
        match &self.backend_override {
            Some(backend) => Arc::clone(backend),
            None => transport::backend_for(profile),
        }
    }

    /// `<base>/auto_fav_sync/<custom folder>`, or the sync root when no folder is set.
    pub fn main_folder(&self) -> Result<RemotePath> {
        let root = self.config.profile.sync_root();
        if self.config.custom_folder.is_empty() {
            Ok(root)
        } else {
            root.join(&self.config.custom_folder)
        }
    }

    /// Run one full cycle. Structure and addon-data steps only do work when a connection exists.
    pub fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::new();
        let mut step = CycleStep::Idle;

        loop {
            step = step.next();
            if step == CycleStep::Done {
                report.reached = CycleStep::Done;
                break;
            }
            if cancel.is_cancelled() {
                info!("Sync cycle cancelled before {:?}", step);
                report.halted = Some(SyncError::Cancelled);
                break;
            }
            report.reached = step;
            debug!("Sync cycle step {:?}", step);

            match step {
                CycleStep::EnsureRemoteStructure => match self.ensure_remote_structure() {
                    Ok(()) => report.structure = Some(Ok(())),
                    Err(e) => {
                        e.log("Remote structure");
                        report.halted = Some(e);
                        break;
                    }
                },
                CycleStep::SyncAddonData => {
                    let result = self.sync_addon_data();
                    if let Err(e) = &result {
                        e.log("Addon data sync");
                    }
                    report.addon_data = Some(result);
                }
                CycleStep::SyncFavourites => {
                    let result = self.sync_favourites();
                    if let Err(e) = &result {
                        e.log("Favourites sync");
                    }
                    report.favourites = Some(result);
                }
                CycleStep::Idle | CycleStep::Done => {}
            }
        }

        info!("Sync cycle finished at {:?} (success: {})", report.reached, report.is_success());
        report
    }

    /// Make sure the main folder and every static sub-folder exist remotely.
    ///
    /// Nothing to do without a custom folder or a connection. Every folder that is still absent
    /// after the attempt is reported together in one `ManualSetupRequired`.
    pub fn ensure_remote_structure(&self) -> Result<()> {
        if self.config.custom_folder.is_empty() || !self.config.has_connection_configured() {
            debug!("No custom folder or connection configured, remote structure left alone");
            return Ok(());
        }

        let backend = self.backend(&self.config.profile);
        let main = self.main_folder()?;
        let mut folders = vec![main.clone()];
        for name in &self.config.static_folders {
            match main.join(name) {
                Ok(folder) => folders.push(folder),
                Err(e) => warn!("Skip static folder '{}': {}", name, e),
            }
        }

        let missing: Vec<String> = folders
            .iter()
            .filter(|folder| !backend.folder_exists(folder) && !backend.ensure_folder(folder))
            .map(ToString::to_string)
            .collect();

        if missing.is_empty() {
            info!("Remote structure ready under {}", main);
            Ok(())
        } else {
            Err(SyncError::ManualSetupRequired(missing.join(", ")))
        }
    }

    /// Download, combine and upload the main favourites file and each static folder's file.
    pub fn sync_favourites(&self) -> Result<FavouritesOutcome> {
        let local = self.paths.favourites();

        if !self.config.has_connection_configured() {
            return match favourites::backup_to_bak(&local)? {
                Some(bak) => {
                    info!("No connection configured, kept local backup {}", bak.display());
                    Ok(FavouritesOutcome::LocalBackupOnly { bak })
                }
                None => Err(SyncError::ConfigurationIncomplete(
                    "no connection configured and no local favourites".to_string(),
                )),
            };
        }
        if self.config.custom_folder.is_empty() {
            return Err(SyncError::ConfigurationIncomplete(
                "no custom folder configured".to_string(),
            ));
        }

        self.ensure_remote_structure()?;
        let backend = self.backend(&self.config.profile);
        let folder = self.main_folder()?;
        if !backend.folder_exists(&folder) {
            return Err(SyncError::RemoteFolderMissing(folder.to_string()));
        }

        let remote = folder.join(FAVOURITES_FILE)?;
        let main_result = self.sync_favourites_file(backend.as_ref(), &local, &remote);

        let mut static_synced = 0;
        let mut static_failed = Vec::new();
        for name in &self.config.static_folders {
            match self.sync_static_folder(backend.as_ref(), &folder, name) {
                Ok(()) => static_synced += 1,
                Err(e) => {
                    e.log(&format!("Static favourites '{}'", name));
                    static_failed.push(name.clone());
                }
            }
        }

        main_result?;
        Ok(FavouritesOutcome::Synced {
            remote,
            static_synced,
            static_failed,
        })
    }

    fn sync_static_folder(&self, backend: &dyn TransportBackend, main: &RemotePath, name: &str) -> Result<()> {
        let remote = main.join(name)?.join(FAVOURITES_FILE)?;
        fs::create_dir_all(self.paths.static_favourites_dir(name))?;
        self.sync_favourites_file(backend, &self.paths.static_favourites(name), &remote)
    }

    /// `.bak` the local file, fetch the server copy into a scratch file, combine, write, upload.
    fn sync_favourites_file(&self, backend: &dyn TransportBackend, local: &Path, remote: &RemotePath) -> Result<()> {
        if let Err(e) = favourites::backup_to_bak(local) {
            warn!("Could not back up {}: {}", local.display(), e);
        }

        let scratch_dir = local.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(scratch_dir)?;
        let server = {
            let scratch = tempfile::Builder::new()
                .prefix("favourites_server")
                .suffix(".xml")
                .tempfile_in(scratch_dir)?;
            match backend.download(remote, scratch.path()) {
                Ok(()) => Some(FavouritesDocument::parse(scratch.path())),
                Err(e) => {
                    info!("No server copy of {} ({}), using local only", remote, e);
                    None
                }
            }
        };

        let local_doc = FavouritesDocument::parse(local);
        let combined = match (self.config.favourites_sync_mode, server) {
            (FavouritesSyncMode::Overwrite, Some(server)) => server,
            (FavouritesSyncMode::Overwrite, None) => {
                warn!("Overwrite mode without a server copy, keeping {}", local.display());
                local_doc
            }
            (FavouritesSyncMode::Merge, server) => {
                FavouritesDocument::merge_union(&local_doc, &server.unwrap_or_default())
            }
        };

        combined.write(local)?;
        backend.upload(local, remote)?;
        info!("Synced {} favourites with {}", combined.len(), remote);
        Ok(())
    }

    /// Ship `userdata/addon_data` between the main system (upload) and the others (download).
    pub fn sync_addon_data(&self) -> Result<AddonDataOutcome> {
        if !self.config.addon_sync {
            debug!("Addon data sync disabled");
            return Ok(AddonDataOutcome::Skipped);
        }
        if self.config.custom_folder.is_empty() && !self.config.is_main_system {
            debug!("Secondary system without custom folder, addon data sync skipped");
            return Ok(AddonDataOutcome::Skipped);
        }
        if !self.config.has_connection_configured() {
            debug!("No connection configured, addon data sync skipped");
            return Ok(AddonDataOutcome::Skipped);
        }

        let backend = self.backend(&self.config.profile);
        let folder = self.main_folder()?;
        if !backend.folder_exists(&folder) {
            return Err(SyncError::RemoteFolderMissing(folder.to_string()));
        }
        let remote = folder.join(ADDON_DATA_ARCHIVE)?;

        if self.config.is_main_system {
            let zip_path = self.paths.addon_data_archive();
            let files = archive::zip_directory(&self.paths.addon_data(), &zip_path)?;
            match backend.upload(&zip_path, &remote) {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(&zip_path) {
                        warn!("Could not remove {}: {}", zip_path.display(), e);
                    }
                    info!("Uploaded addon data to {}", remote);
                    Ok(AddonDataOutcome::Uploaded { remote, files })
                }
                Err(e) => {
                    warn!("Upload failed, leaving {} in place", zip_path.display());
                    Err(e)
                }
            }
        } else {
            fs::create_dir_all(&self.paths.userdata)?;
            let scratch = tempfile::Builder::new()
                .prefix("addon_data")
                .suffix(".zip")
                .tempfile_in(&self.paths.userdata)?;
            backend.download(&remote, scratch.path())?;
            let report = archive::extract_directory(scratch.path(), &self.paths.addon_data())?;
            info!("Applied addon data from {}", remote);
            Ok(AddonDataOutcome::Downloaded {
                remote,
                extracted: report.extracted,
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::memory::MemoryBackend;
    use std::collections::HashMap;
    use tempfile::TempDir;

    pub(crate) const ADDON_ID: &str = "plugin.me";

    pub(crate) fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let mut store: HashMap<String, String> = [
            ("enable_sync", "true"),
            ("connection_1_host", "nas"),
            ("connection_1_base_path", "media"),
            ("custom_folder", "Living Room"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            store.insert(k.to_string(), v.to_string());
        }
        store
    }

    pub(crate) fn fixture(
        pairs: &[(&str, &str)],
        backend: MemoryBackend,
    ) -> (TempDir, Arc<MemoryBackend>, SyncOrchestrator) {
        let dir = TempDir::new().unwrap();
        let paths = LocalPaths::new(dir.path(), ADDON_ID);
        fs::create_dir_all(&paths.userdata).unwrap();
        let backend = Arc::new(backend);
        let orchestrator = SyncOrchestrator::new(SyncConfiguration::load(&settings(pairs)), paths, ADDON_ID)
            .with_backend(backend.clone());
        (dir, backend, orchestrator)
    }

    fn main_folder() -> RemotePath {
        RemotePath::sync_root("media").join("Living Room").unwrap()
    }

    fn favourites_xml(actions: &[&str]) -> String {
        let items: String = actions
            .iter()
            .map(|a| format!("  <favourite name=\"x\">{}</favourite>\n", a))
            .collect();
        format!("<favourites>\n{}</favourites>\n", items)
    }

    #[test]
    fn test_from_config() {
        let config: Config = toml::from_str(
            r#"
            [paths]
            home = "/srv/kodi"

            [[backup.include]]
            file = "favourites.xml"

            [[backup.include]]
            folder = "plugin.video.x"
            base = "addon_data"
            setting = "backup_video_addon"

            [settings]
            custom_folder = "Kitchen"
            connection_1_host = "nas"
            "#,
        )
        .unwrap();

        let orchestrator = SyncOrchestrator::from_config(&config);
        assert_eq!(orchestrator.paths().userdata, PathBuf::from("/srv/kodi/userdata"));
        assert_eq!(orchestrator.includes.len(), 1);
        assert_eq!(orchestrator.main_folder().unwrap().to_string(), "/auto_fav_sync/kitchen");
    }

    #[test]
    fn test_merge_end_to_end() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        let remote = main_folder().join(FAVOURITES_FILE).unwrap();
        backend.put_file(
            &remote,
            favourites_xml(&["ActivateWindow(10025)", "ActivateWindow(10000)"]).as_bytes(),
        );
        let (_dir, backend, orchestrator) = fixture(&[], backend);
        let local = orchestrator.paths().favourites();
        fs::write(&local, favourites_xml(&["ActivateWindow(10000)"])).unwrap();

        let outcome = orchestrator.sync_favourites().unwrap();
        assert!(matches!(outcome, FavouritesOutcome::Synced { .. }));

        let merged = FavouritesDocument::parse(&local);
        assert_eq!(merged.actions(), ["ActivateWindow(10000)", "ActivateWindow(10025)"]);
        let bak = FavouritesDocument::parse(&favourites::bak_path(&local));
        assert_eq!(bak.actions(), ["ActivateWindow(10000)"]);

        let uploaded = String::from_utf8(backend.file(&remote).unwrap()).unwrap();
        assert!(uploaded.contains("ActivateWindow(10025)"));

        // no scratch files left next to the favourites
        let leftovers: Vec<_> = fs::read_dir(local.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("favourites_server"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_overwrite_mode() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        backend.put_file(
            &main_folder().join(FAVOURITES_FILE).unwrap(),
            favourites_xml(&["PlayMedia(server)"]).as_bytes(),
        );
        let (_dir, _backend, orchestrator) = fixture(&[("favourites_sync_mode", "overwrite")], backend);
        let local = orchestrator.paths().favourites();
        fs::write(&local, favourites_xml(&["PlayMedia(local)"])).unwrap();

        orchestrator.sync_favourites().unwrap();
        assert_eq!(FavouritesDocument::parse(&local).actions(), ["PlayMedia(server)"]);
    }

    #[test]
    fn test_overwrite_mode_without_server_copy_keeps_local() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        let (_dir, backend, orchestrator) = fixture(&[("favourites_sync_mode", "overwrite")], backend);
        let local = orchestrator.paths().favourites();
        fs::write(&local, favourites_xml(&["PlayMedia(local)"])).unwrap();

        orchestrator.sync_favourites().unwrap();
        assert_eq!(FavouritesDocument::parse(&local).actions(), ["PlayMedia(local)"]);
        assert!(backend.file(&main_folder().join(FAVOURITES_FILE).unwrap()).is_some());
    }

    #[test]
    fn test_no_connection_ensure_structure_makes_no_calls() {
        let (_dir, backend, orchestrator) = fixture(&[("connection_1_host", "")], MemoryBackend::new());
        orchestrator.ensure_remote_structure().unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_no_connection_favourites_local_backup_only() {
        let (_dir, backend, orchestrator) = fixture(&[("active_connection", "0")], MemoryBackend::new());
        assert!(matches!(
            orchestrator.sync_favourites(),
            Err(SyncError::ConfigurationIncomplete(_))
        ));

        let local = orchestrator.paths().favourites();
        fs::write(&local, favourites_xml(&["A"])).unwrap();
        match orchestrator.sync_favourites().unwrap() {
            FavouritesOutcome::LocalBackupOnly { bak } => assert!(bak.exists()),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_missing_custom_folder_is_incomplete() {
        let (_dir, _backend, orchestrator) = fixture(&[("custom_folder", "")], MemoryBackend::new());
        assert!(matches!(
            orchestrator.sync_favourites(),
            Err(SyncError::ConfigurationIncomplete(_))
        ));
    }

    #[test]
    fn test_ensure_structure_creates_folders_idempotently() {
        let (_dir, backend, orchestrator) =
            fixture(&[("static_folders", "Anime,Kids")], MemoryBackend::new().with_folder(&RemotePath::base("media")));

        orchestrator.ensure_remote_structure().unwrap();
        assert!(backend.has_folder(&main_folder()));
        assert!(backend.has_folder(&main_folder().join("Anime").unwrap()));
        assert!(backend.has_folder(&main_folder().join("Kids").unwrap()));

        let before = backend.calls().len();
        orchestrator.ensure_remote_structure().unwrap();
        let second: Vec<String> = backend.calls()[before..].to_vec();
        assert!(second.iter().all(|c| c.starts_with("stat")), "{:?}", second);
    }

    #[test]
    fn test_ensure_structure_reports_manual_setup_once() {
        let backend = MemoryBackend::new().with_folder(&RemotePath::base("media"));
        backend.set_deny_mkdir(true);
        let (_dir, _backend, orchestrator) = fixture(&[("static_folders", "Anime")], backend);

        match orchestrator.ensure_remote_structure() {
            Err(SyncError::ManualSetupRequired(missing)) => {
                assert!(missing.contains("living room"));
                assert!(missing.contains("anime"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_static_folder_failure_is_isolated() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        let (_dir, backend, orchestrator) = fixture(&[("static_folders", "Anime,Kids")], backend);
        // a plain file where the Kids folder should go makes that folder fail locally
        let kids = orchestrator.paths().static_favourites_dir("Kids");
        fs::create_dir_all(kids.parent().unwrap()).unwrap();
        fs::write(&kids, "not a folder").unwrap();
        fs::write(orchestrator.paths().favourites(), favourites_xml(&["A"])).unwrap();

        match orchestrator.sync_favourites().unwrap() {
            FavouritesOutcome::Synced {
                static_synced,
                static_failed,
                ..
            } => {
                assert_eq!(static_synced, 1);
                assert_eq!(static_failed, vec!["Kids".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(orchestrator.paths().static_favourites("Anime").exists());
        assert!(backend
            .file(&main_folder().join("Anime").unwrap().join(FAVOURITES_FILE).unwrap())
            .is_some());
    }

    #[test]
    fn test_addon_data_upload_on_main_system() {
        let (_dir, backend, orchestrator) = fixture(&[], MemoryBackend::new().with_folder(&main_folder()));
        let data = orchestrator.paths().addon_data().join("plugin.x");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("settings.xml"), "<settings/>").unwrap();

        match orchestrator.sync_addon_data().unwrap() {
            AddonDataOutcome::Uploaded { files, .. } => assert_eq!(files, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(backend.file(&main_folder().join(ADDON_DATA_ARCHIVE).unwrap()).is_some());
        assert!(!orchestrator.paths().addon_data_archive().exists());
    }

    #[test]
    fn test_addon_data_failed_upload_keeps_zip() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        let (_dir, backend, orchestrator) = fixture(&[], backend);
        fs::create_dir_all(orchestrator.paths().addon_data()).unwrap();
        fs::write(orchestrator.paths().addon_data().join("a.txt"), "a").unwrap();

        // folder check passes, then the server goes away
        struct FlakyUpload(Arc<MemoryBackend>);
        impl TransportBackend for FlakyUpload {
            fn kind(&self) -> transport::ProtocolKind {
                self.0.kind()
            }
            fn upload(&self, _: &Path, remote: &RemotePath) -> Result<()> {
                Err(SyncError::RemoteUnavailable(remote.to_string()))
            }
            fn download(&self, remote: &RemotePath, local: &Path) -> Result<()> {
                self.0.download(remote, local)
            }
            fn folder_exists(&self, remote: &RemotePath) -> bool {
                self.0.folder_exists(remote)
            }
            fn ensure_folder(&self, remote: &RemotePath) -> bool {
                self.0.ensure_folder(remote)
            }
            fn list_directory(&self, remote: &RemotePath) -> Vec<String> {
                self.0.list_directory(remote)
            }
        }
        let orchestrator = orchestrator.with_backend(Arc::new(FlakyUpload(backend)));

        assert!(matches!(
            orchestrator.sync_addon_data(),
            Err(SyncError::RemoteUnavailable(_))
        ));
        assert!(orchestrator.paths().addon_data_archive().exists());
    }

    #[test]
    fn test_addon_data_download_on_secondary_system() {
        let (source_dir, backend, main) = fixture(&[], MemoryBackend::new().with_folder(&main_folder()));
        let data = main.paths().addon_data().join("plugin.x");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("settings.xml"), "<settings/>").unwrap();
        main.sync_addon_data().unwrap();
        drop(source_dir);

        let dir = TempDir::new().unwrap();
        let paths = LocalPaths::new(dir.path(), ADDON_ID);
        let secondary = SyncOrchestrator::new(
            SyncConfiguration::load(&settings(&[("is_main_system", "false")])),
            paths.clone(),
            ADDON_ID,
        )
        .with_backend(backend);

        match secondary.sync_addon_data().unwrap() {
            AddonDataOutcome::Downloaded { extracted, .. } => assert_eq!(extracted, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(
            fs::read_to_string(paths.addon_data().join("plugin.x/settings.xml")).unwrap(),
            "<settings/>"
        );
        let leftovers = fs::read_dir(&paths.userdata)
            .unwrap()
            .flatten()
            .filter(|e| e.path().is_file())
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_addon_data_download_failure_leaves_local_data() {
        let backend = MemoryBackend::new().with_folder(&main_folder());
        let (_dir, backend, orchestrator) = fixture(&[("is_main_system", "false")], backend);
        let data = orchestrator.paths().addon_data().join("plugin.x");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("settings.xml"), "<settings>local</settings>").unwrap();

        let snapshot = || {
            let mut files: Vec<(String, String)> = walkdir::WalkDir::new(orchestrator.paths().addon_data())
                .into_iter()
                .flatten()
                .filter(|e| e.file_type().is_file())
                .map(|e| (e.path().display().to_string(), fs::read_to_string(e.path()).unwrap()))
                .collect();
            files.sort();
            files
        };
        let before = snapshot();
        let no_scratch = || {
            fs::read_dir(&orchestrator.paths().userdata)
                .unwrap()
                .flatten()
                .all(|e| !e.file_name().to_string_lossy().starts_with("addon_data") || e.path().is_dir())
        };

        // archive missing on the server
        assert!(matches!(
            orchestrator.sync_addon_data(),
            Err(SyncError::RemoteUnavailable(_))
        ));
        assert_eq!(snapshot(), before);
        assert!(no_scratch());

        // server unreachable
        backend.set_offline(true);
        assert!(orchestrator.sync_addon_data().is_err());
        assert_eq!(snapshot(), before);
        assert!(no_scratch());
        assert!(backend.file(&main_folder().join(ADDON_DATA_ARCHIVE).unwrap()).is_none());
    }

    #[test]
    fn test_addon_data_gating() {
        let (_dir, backend, orchestrator) = fixture(&[("addon_sync", "false")], MemoryBackend::new());
        assert_eq!(orchestrator.sync_addon_data().unwrap(), AddonDataOutcome::Skipped);

        let (_dir2, _b, orchestrator) =
            fixture(&[("custom_folder", ""), ("is_main_system", "false")], MemoryBackend::new());
        assert_eq!(orchestrator.sync_addon_data().unwrap(), AddonDataOutcome::Skipped);
        assert!(backend.calls().is_empty());

        let (_dir3, _b, orchestrator) = fixture(&[], MemoryBackend::new());
        assert!(matches!(
            orchestrator.sync_addon_data(),
            Err(SyncError::RemoteFolderMissing(_))
        ));
    }

    #[test]
    fn test_cycle_runs_every_step() {
        let backend = MemoryBackend::new().with_folder(&RemotePath::base("media"));
        let (_dir, _backend, orchestrator) = fixture(&[("addon_sync", "false")], backend);
        fs::write(orchestrator.paths().favourites(), favourites_xml(&["A"])).unwrap();

        let report = orchestrator.run_cycle(&CancellationToken::new());
        assert_eq!(report.reached, CycleStep::Done);
        assert!(report.is_success(), "{:?}", report);
        assert_eq!(report.addon_data.unwrap().unwrap(), AddonDataOutcome::Skipped);
    }

    #[test]
    fn test_cycle_halts_on_manual_setup() {
        let backend = MemoryBackend::new();
        backend.set_deny_mkdir(true);
        let (_dir, _backend, orchestrator) = fixture(&[], backend);

        let report = orchestrator.run_cycle(&CancellationToken::new());
        assert_eq!(report.reached, CycleStep::EnsureRemoteStructure);
        assert!(matches!(report.halted, Some(SyncError::ManualSetupRequired(_))));
        assert!(report.favourites.is_none());
    }

    #[test]
    fn test_cancelled_cycle_starts_nothing() {
        let (_dir, backend, orchestrator) = fixture(&[], MemoryBackend::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator.run_cycle(&cancel);
        assert!(report.was_cancelled());
        assert_eq!(report.reached, CycleStep::Idle);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_cycle_continues_after_step_failure() {
        let (_dir, _backend, orchestrator) = fixture(&[], MemoryBackend::new().with_folder(&main_folder()));
        // addon data directory missing: the zip step fails, favourites still run
        fs::write(orchestrator.paths().favourites(), favourites_xml(&["A"])).unwrap();

        let report = orchestrator.run_cycle(&CancellationToken::new());
        assert_eq!(report.reached, CycleStep::Done);
        assert!(matches!(report.addon_data, Some(Err(SyncError::Io(_)))));
        assert!(matches!(report.favourites, Some(Ok(FavouritesOutcome::Synced { .. }))));
        assert!(!report.is_success());
    }
}
