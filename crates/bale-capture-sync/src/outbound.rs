//! Outbound sync: hand pending capture records to the remote system.
//!
//! Records are exported oldest first, CBOR-encoded one per envelope. Only ids
//! the sink acknowledges are flipped to exported; everything else stays
//! pending and goes out again on the next pass.

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};

use bale_capture_core::{CaptureId, CaptureRecord};
use bale_capture_store::{now_millis, Store};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::link::{LinkMonitor, LinkStatus};

/// One capture record on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEnvelope {
    pub id: CaptureId,
    /// CBOR encoding of the [`CaptureRecord`].
    pub body: Bytes,
}

impl ExportEnvelope {
    pub fn encode(record: &CaptureRecord) -> Result<Self> {
        let mut buf = Vec::new();
        ciborium::into_writer(record, &mut buf)
            .map_err(|e| SyncError::Encoding(format!("capture {}: {}", record.id, e)))?;
        Ok(Self {
            id: record.id,
            body: Bytes::from(buf),
        })
    }

    pub fn decode(&self) -> Result<CaptureRecord> {
        let record: CaptureRecord = ciborium::from_reader(self.body.as_ref())
            .map_err(|e| SyncError::Encoding(format!("capture {}: {}", self.id, e)))?;
        if record.id != self.id {
            return Err(SyncError::Encoding(format!(
                "envelope id {} does not match body id {}",
                self.id, record.id
            )));
        }
        Ok(record)
    }
}

/// Remote collaborator that receives capture records.
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// Deliver a batch. Returns the ids the remote acknowledged.
    async fn deliver(&self, batch: &[ExportEnvelope]) -> Result<Vec<CaptureId>>;
}

#[async_trait]
impl<K: ExportSink + ?Sized> ExportSink for std::sync::Arc<K> {
    async fn deliver(&self, batch: &[ExportEnvelope]) -> Result<Vec<CaptureId>> {
        (**self).deliver(batch).await
    }
}

/// What one export pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub batches: usize,
    /// Envelopes handed to the sink.
    pub delivered: usize,
    /// Records flipped to exported.
    pub acknowledged: usize,
}

/// Drains pending captures from a [`Store`] into an [`ExportSink`].
pub struct Exporter<S: Store, K: ExportSink> {
    store: S,
    sink: K,
    config: SyncConfig,
    link: LinkMonitor,
}

impl<S: Store, K: ExportSink> Exporter<S, K> {
    pub fn new(store: S, sink: K, config: SyncConfig, link: LinkMonitor) -> Self {
        Self {
            store,
            sink,
            config,
            link,
        }
    }

    /// Export up to `max_batches_per_pass` batches.
    ///
    /// A sink failure ends the pass with `SyncError::Sink` and marks the link
    /// offline. Batches acknowledged before the failure stay exported.
    pub async fn pass(&self) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let limit = self.config.export_batch_size.max(1);

        for _ in 0..self.config.max_batches_per_pass.max(1) {
            let pending = self.store.pending_exports(limit).await?;
            if pending.is_empty() {
                break;
            }

            let envelopes = pending
                .iter()
                .map(ExportEnvelope::encode)
                .collect::<Result<Vec<_>>>()?;

            let acked = match self.sink.deliver(&envelopes).await {
                Ok(acked) => {
                    self.link.report(LinkStatus::Online);
                    acked
                }
                Err(e) => {
                    if e.is_remote() {
                        self.link.report(LinkStatus::Offline);
                    }
                    warn!(error = %e, pending = envelopes.len(), "export_delivery_failed");
                    return Err(e);
                }
            };

            // Ignore acknowledgements for ids this batch never offered.
            let offered: HashSet<CaptureId> = envelopes.iter().map(|e| e.id).collect();
            let acked: Vec<CaptureId> = acked
                .into_iter()
                .filter(|id| offered.contains(id))
                .collect();

            let marked = self.store.mark_exported(&acked, now_millis()).await?;
            report.batches += 1;
            report.delivered += envelopes.len();
            report.acknowledged += marked;

            if acked.len() < envelopes.len() {
                // The sink is holding some back; resending now would repeat them.
                warn!(
                    offered = envelopes.len(),
                    acknowledged = acked.len(),
                    "export_partially_acknowledged"
                );
                break;
            }
        }

        info!(
            batches = report.batches,
            delivered = report.delivered,
            acknowledged = report.acknowledged,
            "export_pass_complete"
        );
        Ok(report)
    }
}

/// In-process export sink for tests and demos.
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySinkInner {
        received: Vec<CaptureRecord>,
        offline: bool,
        ack_limit: Option<usize>,
        deliveries: usize,
    }

    /// In-memory [`ExportSink`] that decodes and keeps what it receives.
    #[derive(Default)]
    pub struct MemorySink {
        inner: Mutex<MemorySinkInner>,
    }

    impl MemorySink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every delivery fail as if the remote were unreachable.
        pub fn set_offline(&self, offline: bool) {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).offline = offline;
        }

        /// Acknowledge at most `limit` records per delivery (`None` = all).
        pub fn ack_at_most(&self, limit: Option<usize>) {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).ack_limit = limit;
        }

        /// Records received and acknowledged so far.
        pub fn received(&self) -> Vec<CaptureRecord> {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .received
                .clone()
        }

        /// Number of deliver calls, failed ones included.
        pub fn delivery_count(&self) -> usize {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).deliveries
        }
    }

    #[async_trait]
    impl ExportSink for MemorySink {
        async fn deliver(&self, batch: &[ExportEnvelope]) -> Result<Vec<CaptureId>> {
            let mut inner = self
                .inner
                .lock()
                .map_err(|e| SyncError::Sink(format!("sink lock poisoned: {}", e)))?;
            inner.deliveries += 1;

            if inner.offline {
                return Err(SyncError::Sink("sink offline".into()));
            }

            let take = inner.ack_limit.unwrap_or(batch.len()).min(batch.len());
            let mut acked = Vec::with_capacity(take);
            for envelope in &batch[..take] {
                let record = envelope.decode()?;
                inner.received.push(record);
                acked.push(envelope.id);
            }
            Ok(acked)
        }
    }
}
