//! Sync orchestration: the per-cycle state machine and the operations it sequences.

pub mod backup;
pub mod orchestrator;

pub use backup::BackupOutcome;
pub use orchestrator::{AddonDataOutcome, CycleReport, CycleStep, FavouritesOutcome, SyncOrchestrator};
