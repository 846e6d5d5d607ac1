//! Create a backup from a populated home, validate it, and restore it into a fresh home.

use buildsync::archive::{self, RestoreOptions};
use buildsync::config::Config;
use buildsync::SyncOrchestrator;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;

const ADDON_ID: &str = "plugin.program.dokukanal.buildsync";

fn config_for(home: &Path) -> Config {
    toml::from_str(&format!(
        r#"
        [paths]
        home = "{}"

        [settings]
        backup_include_addon_data = true
        "#,
        home.display()
    ))
    .unwrap()
}

fn populate(home: &Path) {
    let userdata = home.join("userdata");
    fs::create_dir_all(userdata.join("addon_data/plugin.video.x")).unwrap();
    fs::create_dir_all(userdata.join(format!("addon_data/{}", ADDON_ID))).unwrap();
    fs::create_dir_all(userdata.join("Thumbnails")).unwrap();
    fs::create_dir_all(userdata.join("cache")).unwrap();
    fs::create_dir_all(home.join("addons/skin.estuary")).unwrap();
    fs::create_dir_all(home.join("addons/packages")).unwrap();

    fs::write(userdata.join("favourites.xml"), "<favourites/>").unwrap();
    fs::write(userdata.join("addon_data/plugin.video.x/settings.xml"), "<settings/>").unwrap();
    fs::write(userdata.join(format!("addon_data/{}/settings.xml", ADDON_ID)), "live").unwrap();
    fs::write(userdata.join("Thumbnails/a.jpg"), "jpg").unwrap();
    fs::write(userdata.join("cache/x"), "cache").unwrap();
    fs::write(userdata.join("kodi.log"), "log").unwrap();
    fs::write(home.join("addons/skin.estuary/addon.xml"), "<addon/>").unwrap();
    fs::write(home.join("addons/packages/old.zip"), "pkg").unwrap();
}

#[test]
fn test_create_validate_restore() {
    let source = TempDir::new().unwrap();
    populate(source.path());
    let orchestrator = SyncOrchestrator::from_config(&config_for(source.path()));

    let outcome = orchestrator.create_backup(&CancellationToken::new()).unwrap();
    let zip = match outcome {
        buildsync::sync::BackupOutcome::Local(zip) => zip,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert!(archive::is_valid_backup(&zip, ADDON_ID));
    assert!(!archive::is_valid_backup(&zip, "plugin.someone.else"));

    let target = TempDir::new().unwrap();
    let options = RestoreOptions {
        extract_root: target.path().to_path_buf(),
        addon_id: ADDON_ID.to_string(),
        wipe_first: false,
        temp_dir: target.path().join("temp"),
    };
    let report = archive::restore_from_zip(&zip, &options, &archive::no_cancel).unwrap();

    // own addon data is never restored over the live configuration
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.extracted, 4);

    let restored = target.path();
    assert!(restored.join("userdata/favourites.xml").exists());
    assert!(restored.join("userdata/Thumbnails/a.jpg").exists());
    assert!(restored.join("userdata/addon_data/plugin.video.x/settings.xml").exists());
    assert!(restored.join("addons/skin.estuary/addon.xml").exists());
    assert!(!restored.join(format!("userdata/addon_data/{}", ADDON_ID)).exists());
    assert!(!restored.join("userdata/cache").exists());
    assert!(!restored.join("userdata/kodi.log").exists());
    assert!(!restored.join("addons/packages").exists());
}

#[test]
fn test_hostile_entry_is_skipped_and_the_rest_restored() {
    let dir = TempDir::new().unwrap();
    let zip_path = dir.path().join("doku_backup_01012024_1200.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
    for name in ["userdata/favourites.xml", "addons/skin.x/addon.xml"] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(b"ok").unwrap();
    }
    zip.start_file("userdata/../../../etc/cron.d/evil", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"evil").unwrap();
    zip.finish().unwrap();

    // the whole archive fails validation...
    assert!(!archive::is_valid_backup(&zip_path, ADDON_ID));

    // ...and a direct restore still refuses the hostile entry
    let target = dir.path().join("root");
    let options = RestoreOptions {
        extract_root: target.clone(),
        addon_id: ADDON_ID.to_string(),
        wipe_first: false,
        temp_dir: dir.path().join("temp"),
    };
    let report = archive::restore_from_zip(&zip_path, &options, &archive::no_cancel).unwrap();
    assert_eq!(report.extracted, 2);
    assert_eq!(report.skipped, 1);
    assert!(!dir.path().join("etc").exists());
    assert!(target.join("userdata/favourites.xml").exists());
}
