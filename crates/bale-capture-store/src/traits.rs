//! Store trait: the abstract interface of the local reconciliation store.
//!
//! The capture path needs three things from it: a point lookup of units by
//! code, an insert of capture records, and the guarantee that both observe a
//! consistent snapshot while replication writes concurrently. The remaining
//! operations serve replication, export and diagnostics.

use async_trait::async_trait;
use bale_capture_core::{
    CaptureId, CaptureRecord, OperationContext, ReplicaBatch, ResolvedCapture, UnitReference,
};

use crate::error::Result;

/// Result of inserting a capture record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted and is now visible to local reads.
    Inserted,
    /// The very same record (same id) already exists. Not an error.
    AlreadyExists,
    /// A different record already captured this code in this context.
    Conflict {
        /// The id of the existing record.
        existing: CaptureId,
    },
}

/// Result of applying a replication batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// All changes were applied and the cursor advanced.
    Applied { upserted: usize, removed: usize },
    /// The batch cursor is not ahead of the stored cursor; nothing changed.
    Stale { current: u64 },
}

/// Row counts for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub units: usize,
    pub captures: usize,
    pub pending: usize,
}

/// The Store trait: async interface of the local reconciliation store.
///
/// # Consistency
///
/// - Every read observes one committed state. A replication batch is either
///   entirely visible or not visible at all.
/// - A capture insert is visible to local reads as soon as the call returns.
/// - Nothing here touches the network.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Unit Operations (read side of replication)
    // ─────────────────────────────────────────────────────────────────────────

    /// Exact-match lookup of a unit by code.
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>>;

    /// Apply a replication batch atomically.
    ///
    /// Batches whose cursor is not greater than the stored cursor are skipped.
    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome>;

    /// The cursor of the last applied batch (0 if none).
    async fn sync_cursor(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Capture Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a capture record.
    ///
    /// # Returns
    /// - `Inserted` if the record was new.
    /// - `AlreadyExists` if the exact same record already exists.
    /// - `Conflict` if the code was already captured in the same context.
    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult>;

    /// Get a capture by id.
    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>>;

    /// Get the capture of a code within a context.
    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>>;

    /// List captures ordered by capture time, optionally for one context.
    async fn list_captures(&self, context: Option<OperationContext>)
        -> Result<Vec<CaptureRecord>>;

    /// List captures joined with the unit currently stored for each code.
    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Export Operations (for outbound sync)
    // ─────────────────────────────────────────────────────────────────────────

    /// Oldest pending captures, at most `limit`.
    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>>;

    /// Mark captures as exported. Returns how many changed state.
    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize>;

    /// Row counts.
    async fn counts(&self) -> Result<StoreCounts>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>> {
        (**self).find_unit(code).await
    }

    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome> {
        (**self).apply_unit_batch(batch).await
    }

    async fn sync_cursor(&self) -> Result<u64> {
        (**self).sync_cursor().await
    }

    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult> {
        (**self).insert_capture(record).await
    }

    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>> {
        (**self).get_capture(id).await
    }

    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>> {
        (**self).find_capture(code, context).await
    }

    async fn list_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<CaptureRecord>> {
        (**self).list_captures(context).await
    }

    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>> {
        (**self).resolve_captures(context).await
    }

    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>> {
        (**self).pending_exports(limit).await
    }

    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize> {
        (**self).mark_exported(ids, at).await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        (**self).counts().await
    }
}
