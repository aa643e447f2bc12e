//! Sync configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for replication and export behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum records handed to the sink in one delivery.
    pub export_batch_size: usize,
    /// Maximum unit changes requested from the source in one batch.
    pub import_batch_size: usize,
    /// Maximum batches pulled or pushed in one pass.
    pub max_batches_per_pass: usize,
    /// Delay between passes of a background replicator.
    pub poll_interval_ms: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            export_batch_size: 50,
            import_batch_size: 200,
            max_batches_per_pass: 16,
            poll_interval_ms: 30_000,
        }
    }
}
