//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and by clients
//! that run without a database file.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use bale_capture_core::{
    CaptureId, CaptureRecord, ExportState, OperationContext, ReplicaBatch, ResolvedCapture,
    UnitChange, UnitReference,
};

use crate::error::{Result, StoreError};
use crate::traits::{BatchOutcome, InsertResult, Store, StoreCounts};

/// In-memory store implementation.
///
/// A replication batch is applied under one write guard, so readers see it
/// entirely or not at all.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Units indexed by code.
    units: HashMap<String, UnitReference>,

    /// Captures indexed by id.
    captures: HashMap<CaptureId, CaptureRecord>,

    /// Natural key index: (code, context) -> capture id.
    by_key: HashMap<(String, OperationContext), CaptureId>,

    /// Last applied replication cursor.
    cursor: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn sorted_captures(&self, context: Option<OperationContext>) -> Vec<&CaptureRecord> {
        let mut records: Vec<&CaptureRecord> = self
            .captures
            .values()
            .filter(|r| context.map_or(true, |c| r.context == c))
            .collect();
        records.sort_by_key(|r| (r.captured_at, r.id));
        records
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>> {
        let inner = self.read()?;
        Ok(inner.units.get(code).cloned())
    }

    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome> {
        let mut inner = self.write()?;

        if batch.cursor <= inner.cursor {
            return Ok(BatchOutcome::Stale {
                current: inner.cursor,
            });
        }

        let mut upserted = 0;
        let mut removed = 0;
        for change in &batch.changes {
            match change {
                UnitChange::Upsert(unit) => {
                    inner.units.insert(unit.code.clone(), unit.clone());
                    upserted += 1;
                }
                UnitChange::Remove { code } => {
                    if inner.units.remove(code).is_some() {
                        removed += 1;
                    }
                }
            }
        }
        inner.cursor = batch.cursor;

        Ok(BatchOutcome::Applied { upserted, removed })
    }

    async fn sync_cursor(&self) -> Result<u64> {
        Ok(self.read()?.cursor)
    }

    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.captures.contains_key(&record.id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let key = (record.code.as_str().to_string(), record.context);
        if let Some(&existing) = inner.by_key.get(&key) {
            return Ok(InsertResult::Conflict { existing });
        }

        inner.captures.insert(record.id, record.clone());
        inner.by_key.insert(key, record.id);

        Ok(InsertResult::Inserted)
    }

    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>> {
        let inner = self.read()?;
        Ok(inner.captures.get(id).cloned())
    }

    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>> {
        let inner = self.read()?;
        Ok(inner
            .by_key
            .get(&(code.to_string(), context))
            .and_then(|id| inner.captures.get(id))
            .cloned())
    }

    async fn list_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<CaptureRecord>> {
        let inner = self.read()?;
        Ok(inner.sorted_captures(context).into_iter().cloned().collect())
    }

    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>> {
        let inner = self.read()?;
        Ok(inner
            .sorted_captures(context)
            .into_iter()
            .map(|record| ResolvedCapture {
                record: record.clone(),
                unit: inner.units.get(record.code.as_str()).cloned(),
            })
            .collect())
    }

    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>> {
        let inner = self.read()?;
        Ok(inner
            .sorted_captures(None)
            .into_iter()
            .filter(|r| r.export.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize> {
        let mut inner = self.write()?;
        let mut changed = 0;
        for id in ids {
            if let Some(record) = inner.captures.get_mut(id) {
                if record.export.is_pending() {
                    record.export = ExportState::Exported { at };
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let inner = self.read()?;
        Ok(StoreCounts {
            units: inner.units.len(),
            captures: inner.captures.len(),
            pending: inner
                .captures
                .values()
                .filter(|r| r.export.is_pending())
                .count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_capture_core::BaleCode;

    fn record(code: &str, context: OperationContext, at: i64) -> CaptureRecord {
        CaptureRecord::new(BaleCode::parse(code).unwrap(), context, at)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let r = record("1234567892", OperationContext::Receiving, 1000);

        let result = store.insert_capture(&r).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let retrieved = store.get_capture(&r.id).await.unwrap().unwrap();
        assert_eq!(retrieved, r);
    }

    #[tokio::test]
    async fn test_memory_store_idempotent() {
        let store = MemoryStore::new();
        let r = record("1234567892", OperationContext::Receiving, 1000);

        assert_eq!(store.insert_capture(&r).await.unwrap(), InsertResult::Inserted);
        assert_eq!(
            store.insert_capture(&r).await.unwrap(),
            InsertResult::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_memory_store_conflict_same_context() {
        let store = MemoryStore::new();
        let first = record("1234567892", OperationContext::Receiving, 1000);
        let second = record("1234567892", OperationContext::Receiving, 2000);
        let other_context = record("1234567892", OperationContext::Dispatch, 2000);

        store.insert_capture(&first).await.unwrap();
        assert_eq!(
            store.insert_capture(&second).await.unwrap(),
            InsertResult::Conflict { existing: first.id }
        );
        assert_eq!(
            store.insert_capture(&other_context).await.unwrap(),
            InsertResult::Inserted
        );
    }

    #[tokio::test]
    async fn test_memory_store_stale_batch() {
        let store = MemoryStore::new();
        let batch = ReplicaBatch::upserts(5, vec![UnitReference::new("1234567892", 1)]);
        assert!(matches!(
            store.apply_unit_batch(&batch).await.unwrap(),
            BatchOutcome::Applied { upserted: 1, .. }
        ));

        let stale = ReplicaBatch::new(
            5,
            vec![UnitChange::Remove {
                code: "1234567892".into(),
            }],
        );
        assert_eq!(
            store.apply_unit_batch(&stale).await.unwrap(),
            BatchOutcome::Stale { current: 5 }
        );
        assert!(store.find_unit("1234567892").await.unwrap().is_some());
    }
}
