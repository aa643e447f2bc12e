//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during replication or export.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] bale_capture_store::StoreError),

    /// The remote unit source failed or is unreachable.
    #[error("unit source error: {0}")]
    Source(String),

    /// The remote export sink failed or is unreachable.
    #[error("export sink error: {0}")]
    Sink(String),

    /// A capture record could not be encoded for export.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The source handed back a batch that breaks the replication contract.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
}

impl SyncError {
    /// Whether the failure is on the remote side of the link.
    pub fn is_remote(&self) -> bool {
        matches!(self, SyncError::Source(_) | SyncError::Sink(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
