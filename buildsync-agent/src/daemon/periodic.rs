//! The long-running service: one startup cycle, then periodic favourites syncs.
//!
//! Configuration is reloaded through the loader on every tick. Sync work is blocking and runs
//! on the blocking pool; the loop itself only waits for the next tick or for cancellation.

use crate::sync::{CycleReport, FavouritesOutcome, SyncOrchestrator};
use crate::utils::errors::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Builds an orchestrator from the current configuration.
pub type Loader = Arc<dyn Fn() -> anyhow::Result<SyncOrchestrator> + Send + Sync>;

/// Counters for the periodic loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodicStats {
    pub ticks: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum TickOutcome {
    Synced,
    Skipped,
    Failed,
}

/// Run the startup cycle (when sync is enabled) and then the periodic loop until `cancel` fires.
///
/// Returns the startup report, `None` when sync was disabled at startup.
pub async fn run_service(load: Loader, cancel: CancellationToken) -> anyhow::Result<Option<CycleReport>> {
    let orchestrator = load()?;
    let interval_minutes = orchestrator.config().favourites_sync_interval_minutes;

    let startup = if orchestrator.config().enabled {
        let token = cancel.clone();
        let report = tokio::task::spawn_blocking(move || orchestrator.run_cycle(&token)).await?;
        Some(report)
    } else {
        info!("Sync disabled, startup cycle skipped");
        None
    };

    if interval_minutes == 0 {
        info!("No sync interval configured, service done after startup");
        return Ok(startup);
    }
    if cancel.is_cancelled() {
        return Ok(startup);
    }

    info!("Syncing favourites every {} minutes", interval_minutes);
    periodic_loop(load, Duration::from_secs(interval_minutes * 60), cancel).await;
    Ok(startup)
}

/// Sync favourites every `period` (first tick after one full period) until cancelled.
pub async fn periodic_loop(load: Loader, period: Duration, cancel: CancellationToken) -> PeriodicStats {
    let mut stats = PeriodicStats::default();
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                stats.ticks += 1;
                let load = Arc::clone(&load);
                match tokio::task::spawn_blocking(move || periodic_tick(&load)).await {
                    Ok(TickOutcome::Synced) => stats.synced += 1,
                    Ok(TickOutcome::Skipped) => stats.skipped += 1,
                    Ok(TickOutcome::Failed) => stats.failed += 1,
                    Err(e) => {
                        error!("Periodic sync task failed: {}", e);
                        stats.failed += 1;
                    }
                }
            }
        }
    }

    info!(
        "Periodic sync stopped ({} ticks, {} synced, {} skipped, {} failed)",
        stats.ticks, stats.synced, stats.skipped, stats.failed
    );
    stats
}

fn periodic_tick(load: &Loader) -> TickOutcome {
    let orchestrator = match load() {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("Reloading configuration failed: {:#}", e);
            return TickOutcome::Failed;
        }
    };

    let config = orchestrator.config();
    if !config.enabled || config.custom_folder.is_empty() {
        debug!("Sync disabled or no custom folder, tick skipped");
        return TickOutcome::Skipped;
    }

    log_favourites(orchestrator.sync_favourites())
}

fn log_favourites(result: Result<FavouritesOutcome>) -> TickOutcome {
    match result {
        Ok(FavouritesOutcome::LocalBackupOnly { bak }) => {
            info!("Periodic sync kept a local backup only: {}", bak.display());
            TickOutcome::Synced
        }
        Ok(FavouritesOutcome::Synced { remote, .. }) => {
            info!("Periodic sync finished with {}", remote);
            TickOutcome::Synced
        }
        Err(e) => {
            e.log("Periodic favourites sync");
            TickOutcome::Failed
        }
    }
}
