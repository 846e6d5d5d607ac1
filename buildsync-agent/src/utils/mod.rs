//! Error taxonomy and logging setup.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
