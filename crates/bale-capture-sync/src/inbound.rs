//! Inbound replication: pull unit changes from the remote system into the
//! local store.
//!
//! The remote side is a [`UnitSource`] addressed by a monotonically
//! increasing cursor. Each batch it hands back is applied with a single
//! [`Store::apply_unit_batch`] call, so a concurrent lookup sees a batch
//! entirely or not at all.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use bale_capture_core::ReplicaBatch;
use bale_capture_store::{BatchOutcome, Store};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::link::{LinkMonitor, LinkStatus};

/// Remote collaborator that serves unit changes.
#[async_trait]
pub trait UnitSource: Send + Sync {
    /// Changes after `cursor`, at most `limit` of them.
    ///
    /// Returns `None` when nothing newer than `cursor` exists.
    async fn fetch_since(&self, cursor: u64, limit: usize) -> Result<Option<ReplicaBatch>>;
}

#[async_trait]
impl<U: UnitSource + ?Sized> UnitSource for std::sync::Arc<U> {
    async fn fetch_since(&self, cursor: u64, limit: usize) -> Result<Option<ReplicaBatch>> {
        (**self).fetch_since(cursor, limit).await
    }
}

/// What one or more replication passes did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Batches applied to the store.
    pub batches_applied: usize,
    /// Batches the store skipped because its cursor was already past them.
    pub batches_stale: usize,
    pub upserted: usize,
    pub removed: usize,
    /// Store cursor after the last pass.
    pub cursor: u64,
    /// Whether the source reported nothing newer.
    pub drained: bool,
}

impl ReplicationReport {
    fn absorb(&mut self, other: ReplicationReport) {
        self.batches_applied += other.batches_applied;
        self.batches_stale += other.batches_stale;
        self.upserted += other.upserted;
        self.removed += other.removed;
        self.cursor = other.cursor;
        self.drained = other.drained;
    }
}

/// Pulls batches from a [`UnitSource`] and applies them to a [`Store`].
pub struct Replicator<S: Store, U: UnitSource> {
    store: S,
    source: U,
    config: SyncConfig,
    link: Option<LinkMonitor>,
}

impl<S: Store, U: UnitSource> Replicator<S, U> {
    pub fn new(store: S, source: U, config: SyncConfig) -> Self {
        Self {
            store,
            source,
            config,
            link: None,
        }
    }

    /// Report source reachability into a link monitor.
    pub fn with_link(mut self, link: LinkMonitor) -> Self {
        self.link = Some(link);
        self
    }

    /// Apply up to `max_batches_per_pass` batches.
    pub async fn pass(&self) -> Result<ReplicationReport> {
        let mut report = ReplicationReport {
            cursor: self.store.sync_cursor().await?,
            ..Default::default()
        };
        let limit = self.config.import_batch_size.max(1);

        for _ in 0..self.config.max_batches_per_pass.max(1) {
            let fetched = self.source.fetch_since(report.cursor, limit).await;
            self.report_link(&fetched);
            let Some(batch) = fetched? else {
                report.drained = true;
                break;
            };

            check_batch(report.cursor, limit, &batch)?;

            match self.store.apply_unit_batch(&batch).await? {
                BatchOutcome::Applied { upserted, removed } => {
                    report.batches_applied += 1;
                    report.upserted += upserted;
                    report.removed += removed;
                    report.cursor = batch.cursor;
                    info!(
                        cursor = batch.cursor,
                        upserted = upserted,
                        removed = removed,
                        "replica_batch_applied"
                    );
                }
                BatchOutcome::Stale { current } => {
                    // Another writer moved the cursor; resume from there.
                    report.batches_stale += 1;
                    report.cursor = current;
                    warn!(batch_cursor = batch.cursor, current = current, "replica_batch_stale");
                }
            }
        }

        Ok(report)
    }

    /// Run passes until the source has nothing newer.
    pub async fn drain(&self) -> Result<ReplicationReport> {
        let mut total = ReplicationReport::default();
        loop {
            let report = self.pass().await?;
            let drained = report.drained;
            total.absorb(report);
            if drained {
                debug!(cursor = total.cursor, "replica_drained");
                return Ok(total);
            }
        }
    }

    /// Background loop: drain, wait `poll_interval`, repeat until shutdown.
    ///
    /// Source and store failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ReplicationReport {
        let mut total = ReplicationReport::default();
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "replicator_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.drain() => match result {
                    Ok(report) => total.absorb(report),
                    Err(e) => warn!(error = %e, "replication_pass_failed"),
                },
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(cursor = total.cursor, "replicator_stopped");
        total
    }

    fn report_link<T>(&self, fetched: &Result<T>) {
        if let Some(link) = &self.link {
            match fetched {
                Ok(_) => link.report(LinkStatus::Online),
                Err(e) if e.is_remote() => link.report(LinkStatus::Offline),
                Err(_) => {}
            }
        }
    }
}

/// Reject batches that would move the cursor backwards or exceed the request.
fn check_batch(since: u64, limit: usize, batch: &ReplicaBatch) -> Result<()> {
    if batch.cursor <= since {
        return Err(SyncError::InvalidBatch(format!(
            "cursor {} does not advance past {}",
            batch.cursor, since
        )));
    }
    if batch.len() > limit {
        return Err(SyncError::InvalidBatch(format!(
            "{} changes exceed the requested limit of {}",
            batch.len(),
            limit
        )));
    }
    if let Some(change) = batch.changes.iter().find(|c| c.code().is_empty()) {
        return Err(SyncError::InvalidBatch(format!(
            "change with empty code: {:?}",
            change
        )));
    }
    Ok(())
}

/// In-process unit source for tests and demos.
///
/// Keeps an append-only change log. The cursor of a change is its 1-based
/// position in the log.
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    use bale_capture_core::{UnitChange, UnitReference};

    #[derive(Default)]
    struct MemorySourceInner {
        log: Vec<UnitChange>,
        offline: bool,
        fetches: usize,
    }

    /// In-memory [`UnitSource`].
    #[derive(Default)]
    pub struct MemorySource {
        inner: Mutex<MemorySourceInner>,
    }

    impl MemorySource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a change; returns its cursor.
        pub fn push(&self, change: UnitChange) -> u64 {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.log.push(change);
            inner.log.len() as u64
        }

        pub fn upsert(&self, unit: UnitReference) -> u64 {
            self.push(UnitChange::Upsert(unit))
        }

        pub fn remove(&self, code: impl Into<String>) -> u64 {
            self.push(UnitChange::Remove { code: code.into() })
        }

        /// Make every fetch fail as if the remote were unreachable.
        pub fn set_offline(&self, offline: bool) {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).offline = offline;
        }

        /// Number of fetch calls served, failed ones included.
        pub fn fetch_count(&self) -> usize {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).fetches
        }

        /// Cursor of the newest change.
        pub fn head(&self) -> u64 {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).log.len() as u64
        }
    }

    #[async_trait]
    impl UnitSource for MemorySource {
        async fn fetch_since(&self, cursor: u64, limit: usize) -> Result<Option<ReplicaBatch>> {
            let mut inner = self
                .inner
                .lock()
                .map_err(|e| SyncError::Source(format!("source lock poisoned: {}", e)))?;
            inner.fetches += 1;

            if inner.offline {
                return Err(SyncError::Source("source offline".into()));
            }

            let start = cursor as usize;
            if start >= inner.log.len() {
                return Ok(None);
            }
            let end = start.saturating_add(limit).min(inner.log.len());
            let changes = inner.log[start..end].to_vec();

            Ok(Some(ReplicaBatch::new(end as u64, changes)))
        }
    }
}
