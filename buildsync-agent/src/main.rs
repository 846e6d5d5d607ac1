//! Buildsync - Main entry point
//!
//! Runs the sync service or a single sync, backup or restore operation.

use anyhow::{bail, Result};
use buildsync::archive;
use buildsync::daemon::{self, Loader, ShutdownCoordinator};
use buildsync::sync::{AddonDataOutcome, BackupOutcome, FavouritesOutcome};
use buildsync::transport::{self, ConnectionProfile, ProfileSlot};
use buildsync::{config::Config, settings::SettingsSource, utils, SyncOrchestrator};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Startup cycle, then periodic favourites sync until SIGINT/SIGTERM
    Run,
    /// Sync the main and static favourites once
    SyncFavourites,
    /// Upload (main system) or download (secondary) the addon data archive
    SyncAddonData,
    /// Create the remote folder layout
    EnsureStructure,
    /// Write a full backup
    Backup,
    /// Restore a local backup archive
    Restore {
        zip: PathBuf,
        /// Empty the temp directory first
        #[arg(long)]
        wipe: bool,
    },
    /// Restore a backup stored on the backup connection
    RestoreRemote {
        name: String,
        #[arg(long)]
        wipe: bool,
    },
    /// Download a backup over HTTP(S) and restore it
    RestoreUrl {
        url: String,
        #[arg(long)]
        wipe: bool,
    },
    /// List valid backups, newest first
    ListBackups {
        /// List the backup connection instead of the local directory
        #[arg(long)]
        remote: bool,
    },
    /// Check a backup archive without restoring it
    Validate { zip: PathBuf },
    /// Check a stored connection (defaults to the active one)
    TestConnection { slot: Option<u8> },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting buildsync v{} (addon_id: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.addon_id
    );

    let shutdown = ShutdownCoordinator::new();
    let cancel = shutdown.token();
    let signals = tokio::spawn(async move { shutdown.wait_for_signal().await });

    let result = match args.command {
        Command::Run => run(args.config, cancel).await,
        command => {
            let token = cancel.clone();
            tokio::task::spawn_blocking(move || execute(command, &config, &token)).await?
        }
    };

    signals.abort();
    result
}

async fn run(config_path: Option<PathBuf>, cancel: CancellationToken) -> Result<()> {
    let loader: Loader = Arc::new(move || {
        let config = load_config(config_path.as_deref())?;
        Ok(SyncOrchestrator::from_config(&config))
    });

    if let Some(report) = daemon::run_service(loader, cancel).await? {
        if !report.is_success() && !report.was_cancelled() {
            tracing::warn!("Startup cycle finished with failures");
        }
    }
    tracing::info!("Service stopped");
    Ok(())
}

fn execute(command: Command, config: &Config, cancel: &CancellationToken) -> Result<()> {
    let orchestrator = SyncOrchestrator::from_config(config);

    match command {
        Command::Run => bail!("run is handled by the service loop"),
        Command::SyncFavourites => match orchestrator.sync_favourites()? {
            FavouritesOutcome::LocalBackupOnly { bak } => {
                println!("No connection configured; local backup written to {}", bak.display());
            }
            FavouritesOutcome::Synced {
                remote,
                static_synced,
                static_failed,
            } => {
                println!("Favourites synced with {} ({} static folders)", remote, static_synced);
                if !static_failed.is_empty() {
                    bail!("static folders failed: {}", static_failed.join(", "));
                }
            }
        },
        Command::SyncAddonData => match orchestrator.sync_addon_data()? {
            AddonDataOutcome::Skipped => println!("Addon data sync skipped"),
            AddonDataOutcome::Uploaded { remote, files } => {
                println!("Uploaded {} files to {}", files, remote);
            }
            AddonDataOutcome::Downloaded { remote, extracted } => {
                println!("Extracted {} files from {}", extracted, remote);
            }
        },
        Command::EnsureStructure => {
            orchestrator.ensure_remote_structure()?;
            println!("Remote structure ready");
        }
        Command::Backup => match orchestrator.create_backup(cancel)? {
            BackupOutcome::Local(path) => println!("Backup written to {}", path.display()),
            BackupOutcome::Uploaded { remote } => println!("Backup uploaded to {}", remote),
        },
        Command::Restore { zip, wipe } => {
            let wipe = wipe || orchestrator.config().backup.restore_wipe;
            let report = orchestrator.restore_local(&zip, wipe, cancel)?;
            print_restore(&report)?;
        }
        Command::RestoreRemote { name, wipe } => {
            let wipe = wipe || orchestrator.config().backup.restore_wipe;
            let report = orchestrator.restore_remote(&name, wipe, cancel)?;
            print_restore(&report)?;
        }
        Command::RestoreUrl { url, wipe } => {
            let wipe = wipe || orchestrator.config().backup.restore_wipe;
            let report = orchestrator.restore_url(&url, wipe, cancel)?;
            print_restore(&report)?;
        }
        Command::ListBackups { remote } => {
            if remote {
                for name in orchestrator.list_remote_backups()? {
                    println!("{}", name);
                }
            } else {
                for path in orchestrator.list_local_backups() {
                    println!("{}", path.display());
                }
            }
        }
        Command::Validate { zip } => {
            archive::validate_backup(&zip, &config.agent.addon_id)?;
            println!("{} is a valid backup", zip.display());
        }
        Command::TestConnection { slot } => {
            let number = match slot {
                Some(n) => i64::from(n),
                None => config.settings.get_int("active_connection", 1),
            };
            let Some(slot) = ProfileSlot::from_setting(number) else {
                bail!("connection slot must be 1, 2 or 3 (got {})", number);
            };
            let profile = ConnectionProfile::from_slot(&config.settings, slot);
            println!("{}", profile.summary(&format!("Connection {}", slot.number())));
            transport::test_connection(&config.settings, slot)?;
            println!("Connection OK");
        }
    }
    Ok(())
}

fn print_restore(report: &archive::RestoreReport) -> Result<()> {
    println!(
        "Restored {} files ({} skipped, {} failed)",
        report.extracted, report.skipped, report.failed
    );
    if report.failed > 0 {
        bail!("{} entries could not be restored", report.failed);
    }
    Ok(())
}
