//! Buildsync Agent Library
//!
//! Keeps favourites and addon data in step across media-center installs through an FTP, SFTP or
//! SMB share, and writes and restores whitelisted full-environment ZIP backups.

pub mod archive;
pub mod config;
pub mod daemon;
pub mod favourites;
pub mod fs;
pub mod paths;
pub mod settings;
pub mod sync;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use sync::SyncOrchestrator;
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
