//! Store wrappers that inject failures and delays.
//!
//! Both wrap any [`Store`] and delegate everything they do not interfere
//! with, so scenario tests can run against `MemoryStore` or `SqliteStore`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use bale_capture_core::{
    CaptureId, CaptureRecord, OperationContext, ReplicaBatch, ResolvedCapture, UnitReference,
};
use bale_capture_store::{BatchOutcome, InsertResult, Result, Store, StoreCounts, StoreError};

/// Kind of error a [`FlakyStore`] injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `StoreError::Unavailable`, worth retrying.
    Transient,
    /// `StoreError::InvalidData`, not worth retrying.
    Permanent,
}

impl Fault {
    fn error(self, op: &str) -> StoreError {
        match self {
            Fault::Transient => StoreError::Unavailable(format!("injected fault in {}", op)),
            Fault::Permanent => StoreError::InvalidData(format!("injected fault in {}", op)),
        }
    }
}

/// Fails the first N unit lookups, and optionally every capture insert.
pub struct FlakyStore<S: Store> {
    inner: S,
    fault: Fault,
    failing_lookups: AtomicUsize,
    fail_inserts: AtomicBool,
    lookups: AtomicUsize,
}

impl<S: Store> FlakyStore<S> {
    /// Fail the first `failing_lookups` calls to `find_unit` with `fault`.
    pub fn new(inner: S, failing_lookups: usize, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            failing_lookups: AtomicUsize::new(failing_lookups),
            fail_inserts: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Make every `insert_capture` fail with the configured fault.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Total `find_unit` calls, failed ones included.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(self.fault.error("find_unit"));
        }
        self.inner.find_unit(code).await
    }

    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome> {
        self.inner.apply_unit_batch(batch).await
    }

    async fn sync_cursor(&self) -> Result<u64> {
        self.inner.sync_cursor().await
    }

    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(self.fault.error("insert_capture"));
        }
        self.inner.insert_capture(record).await
    }

    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>> {
        self.inner.get_capture(id).await
    }

    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>> {
        self.inner.find_capture(code, context).await
    }

    async fn list_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<CaptureRecord>> {
        self.inner.list_captures(context).await
    }

    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>> {
        self.inner.resolve_captures(context).await
    }

    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>> {
        self.inner.pending_exports(limit).await
    }

    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize> {
        self.inner.mark_exported(ids, at).await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        self.inner.counts().await
    }
}

/// Which store call a [`GatedStore`] parks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `find_unit`: the scan is still being matched.
    Lookup,
    /// `insert_capture`: the record is being written.
    Insert,
}

/// Parks every call at one stage until the gate is opened.
///
/// Lets a test hold a scan in flight for as long as it needs, then release
/// it, without sleeping.
pub struct GatedStore<S: Store> {
    inner: S,
    stage: Stage,
    entered: Notify,
    inserts: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl<S: Store> GatedStore<S> {
    /// Park inserts, with the gate closed.
    pub fn new(inner: S) -> Self {
        Self::at(inner, Stage::Insert)
    }

    /// Park calls at `stage`, with the gate closed.
    pub fn at(inner: S, stage: Stage) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner,
            stage,
            entered: Notify::new(),
            inserts: AtomicUsize::new(0),
            gate,
        }
    }

    /// Wait until a call has reached the gate.
    pub async fn wait_until_parked(&self) {
        self.entered.notified().await;
    }

    /// Let parked and future calls through.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// `insert_capture` calls so far, parked ones included.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn pass(&self, stage: Stage) -> Result<()> {
        if stage != self.stage {
            return Ok(());
        }
        let mut gate = self.gate.subscribe();
        self.entered.notify_one();

        loop {
            if *gate.borrow_and_update() {
                return Ok(());
            }
            gate.changed()
                .await
                .map_err(|_| StoreError::Unavailable("gate dropped".into()))?;
        }
    }
}

#[async_trait]
impl<S: Store> Store for GatedStore<S> {
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>> {
        self.pass(Stage::Lookup).await?;
        self.inner.find_unit(code).await
    }

    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome> {
        self.inner.apply_unit_batch(batch).await
    }

    async fn sync_cursor(&self) -> Result<u64> {
        self.inner.sync_cursor().await
    }

    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.pass(Stage::Insert).await?;
        self.inner.insert_capture(record).await
    }

    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>> {
        self.inner.get_capture(id).await
    }

    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>> {
        self.inner.find_capture(code, context).await
    }

    async fn list_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<CaptureRecord>> {
        self.inner.list_captures(context).await
    }

    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>> {
        self.inner.resolve_captures(context).await
    }

    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>> {
        self.inner.pending_exports(limit).await
    }

    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize> {
        self.inner.mark_exported(ids, at).await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        self.inner.counts().await
    }
}
