//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use bale_capture_core::{
    append_check_character, BaleCode, CaptureRecord, OperationContext, ReplicaBatch, ScanEvent,
    Symbology, UnitReference,
};
use bale_capture_store::{MemoryStore, Store, StoreError};
use bale_capture_sync::{MemorySink, MemorySource};

/// Build a valid code from nine data characters.
///
/// Panics if `data` is not nine Code 39 symbols.
pub fn code(data: &str) -> BaleCode {
    let full = append_check_character(data)
        .unwrap_or_else(|e| panic!("fixture data {:?} is not a valid data part: {}", data, e));
    BaleCode::parse(&full).unwrap_or_else(|e| panic!("fixture code {:?}: {}", full, e))
}

/// A pending capture record for `data` + its check character.
pub fn record(data: &str, context: OperationContext, captured_at: i64) -> CaptureRecord {
    CaptureRecord::new(code(data), context, captured_at)
}

/// A unit for `code` with typical classification attributes.
pub fn unit(code: &BaleCode, remote_id: i64) -> UnitReference {
    UnitReference::new(code.as_str(), remote_id)
        .with_attribute("grade", "A")
        .with_attribute("weight_class", "standard")
        .with_location("yard-1")
}

/// A Code 39 scan as an Android scanner delivers it, sentinels included.
pub fn code39(payload: &str) -> ScanEvent {
    ScanEvent::new(Symbology::Code39, format!("*{}*", payload))
}

/// A scan with the payload passed through untouched.
pub fn raw_scan(symbology: Symbology, payload: &str) -> ScanEvent {
    ScanEvent::new(symbology, payload)
}

/// A test fixture with a memory store and in-process sync peers.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub source: Arc<MemorySource>,
    pub sink: Arc<MemorySink>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            source: Arc::new(MemorySource::new()),
            sink: Arc::new(MemorySink::new()),
        }
    }

    /// Put units straight into the store as one replicated batch.
    pub async fn seed_units(
        &self,
        units: impl IntoIterator<Item = UnitReference>,
    ) -> Result<(), StoreError> {
        let cursor = self.store.sync_cursor().await? + 1;
        self.store
            .apply_unit_batch(&ReplicaBatch::upserts(cursor, units))
            .await?;
        Ok(())
    }

    /// Publish a unit on the remote source; it arrives on the next replication.
    pub fn publish(&self, unit: UnitReference) -> u64 {
        self.source.upsert(unit)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
