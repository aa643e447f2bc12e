//! Error types for the capture client.

use bale_capture_core::{BaleCode, CaptureId, OperationContext};
use bale_capture_store::StoreError;
use bale_capture_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during capture operations.
///
/// Validation outcomes are not errors; they come back as
/// [`ScanOutcome::Rejected`](crate::ScanOutcome::Rejected).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The store could not be queried, even after retrying.
    ///
    /// The scanned code was valid and is handed back. Whether a later retry
    /// can help depends on `source`; see [`CaptureError::is_retryable`].
    #[error("store unavailable for {code} after {attempts} attempt(s): {source}")]
    TransientStoreUnavailable {
        code: BaleCode,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The capture record could not be written.
    #[error("failed to persist capture of {code} ({context}): {cause}")]
    PersistenceFailure {
        code: BaleCode,
        context: OperationContext,
        #[source]
        cause: PersistenceCause,
    },

    /// The session actor has stopped.
    #[error("capture session closed")]
    SessionClosed,

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl CaptureError {
    /// The validated code the failed operation was about, if any.
    pub fn code(&self) -> Option<&BaleCode> {
        match self {
            CaptureError::TransientStoreUnavailable { code, .. }
            | CaptureError::PersistenceFailure { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the same scan may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptureError::TransientStoreUnavailable { source, .. } => source.is_transient(),
            CaptureError::PersistenceFailure {
                cause: PersistenceCause::Store(e),
                ..
            } => e.is_transient(),
            _ => false,
        }
    }
}

/// Why a capture record was not written.
#[derive(Debug, Error)]
pub enum PersistenceCause {
    /// The code was already captured in this context.
    #[error("already captured as {existing}")]
    Duplicate { existing: CaptureId },

    /// The store rejected the insert.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_failure(source: StoreError) -> CaptureError {
        CaptureError::TransientStoreUnavailable {
            code: BaleCode::parse("1234567892").unwrap(),
            attempts: 3,
            source,
        }
    }

    #[test]
    fn test_retryable_follows_store_error() {
        assert!(lookup_failure(StoreError::Unavailable("busy".into())).is_retryable());
        assert!(!lookup_failure(StoreError::InvalidData("bad row".into())).is_retryable());
    }

    #[test]
    fn test_duplicate_is_not_retryable() {
        let err = CaptureError::PersistenceFailure {
            code: BaleCode::parse("1234567892").unwrap(),
            context: OperationContext::Receiving,
            cause: PersistenceCause::Duplicate {
                existing: CaptureId([1; 32]),
            },
        };
        assert!(!err.is_retryable());
        assert_eq!(err.code().map(|c| c.as_str()), Some("1234567892"));
    }
}
