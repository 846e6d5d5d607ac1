//! Error taxonomy for the sync core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No host, no target folder or a similar missing setting. Expected, not a fault.
    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote folder not found: {0}")]
    RemoteFolderMissing(String),

    /// One or more remote folders could not be created; the user has to create them by hand.
    #[error("Remote folders could not be created, manual setup required: {0}")]
    ManualSetupRequired(String),

    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    #[error("Bad archive: {0}")]
    BadArchive(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Expected, user-facing outcomes that are not logged as errors.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SyncError::ConfigurationIncomplete(_)
                | SyncError::RemoteFolderMissing(_)
                | SyncError::ValidationFailed(_)
                | SyncError::Cancelled
        )
    }

    /// Log this error at the level its kind calls for.
    pub fn log(&self, context: &str) {
        if self.is_expected() {
            tracing::info!("{}: {}", context, self);
        } else {
            tracing::error!("{}: {}", context, self);
        }
    }
}

impl From<zip::result::ZipError> for SyncError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => SyncError::Io(e),
            other => SyncError::BadArchive(other.to_string()),
        }
    }
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
