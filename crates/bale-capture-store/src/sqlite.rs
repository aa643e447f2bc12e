//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.
//!
//! File databases run in WAL mode with two connections: the writer applies
//! replication batches and capture inserts, the reader serves lookups. Every
//! read statement runs in its own implicit read transaction, so it sees one
//! committed snapshot and never waits on the writer. In-memory databases
//! cannot be shared between connections and use one connection for both.
//!
//! Write transactions begin IMMEDIATE, taking the write lock up front, so a
//! lock held by another connection is waited out under the busy timeout.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};

use bale_capture_core::{
    BaleCode, CaptureId, CaptureRecord, ExportState, OperationContext, ReplicaBatch,
    ResolvedCapture, UnitChange, UnitMatch, UnitReference, UnitStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{BatchOutcome, InsertResult, Store, StoreCounts};

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CAPTURE_COLUMNS: &str = "c.capture_id, c.code, c.context, c.captured_at, \
     c.matched_remote_id, c.matched_revision, c.exported_at";

const UNIT_COLUMNS: &str =
    "u.code, u.remote_id, u.revision, u.attributes, u.location, u.status, u.updated_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutexes. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// Connection used for inserts, batches and export bookkeeping.
    writer: Arc<Mutex<Connection>>,
    /// Connection used for lookups. Same as `writer` for in-memory databases.
    reader: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a SQLite database with an explicit busy timeout.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        let mut writer = Connection::open(path)?;
        writer.busy_timeout(busy_timeout)?;
        let mode: String = writer.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        writer.execute_batch("PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        migration::migrate(&mut writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(busy_timeout)?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "store_opened");

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            writer: Arc::clone(&conn),
            reader: conn,
        })
    }
}

/// Run a closure against a connection on the blocking pool.
async fn run<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut conn = conn.lock().map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                Some(format!("mutex poisoned: {}", e)),
            ))
        })?;
        f(&mut conn)
    })
    .await
    .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
}

fn conversion_error<E>(column: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, ty, Box::new(e))
}

fn encode_attributes(attributes: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(attributes, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

// Helper to convert a row to CaptureRecord; expects CAPTURE_COLUMNS first.
fn row_to_capture(row: &Row<'_>) -> rusqlite::Result<CaptureRecord> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let id = CaptureId::try_from(id_bytes.as_slice()).map_err(|e| conversion_error(0, Type::Blob, e))?;

    let code_text: String = row.get(1)?;
    let code = BaleCode::parse(&code_text).map_err(|e| conversion_error(1, Type::Text, e))?;

    let context = OperationContext::try_from(row.get::<_, u16>(2)?)
        .map_err(|e| conversion_error(2, Type::Integer, e))?;

    let matched_remote_id: Option<i64> = row.get(4)?;
    let matched_revision: Option<i64> = row.get(5)?;
    let matched_unit = match (matched_remote_id, matched_revision) {
        (Some(remote_id), Some(revision)) => Some(UnitMatch {
            remote_id,
            revision: revision as u64,
        }),
        _ => None,
    };

    let exported_at: Option<i64> = row.get(6)?;
    let export = match exported_at {
        Some(at) => ExportState::Exported { at },
        None => ExportState::Pending,
    };

    Ok(CaptureRecord {
        id,
        code,
        context,
        captured_at: row.get(3)?,
        matched_unit,
        export,
    })
}

// Helper to convert a row to UnitReference; `offset` is the index of u.code.
fn row_to_unit(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<UnitReference>> {
    let code: Option<String> = row.get(offset)?;
    let Some(code) = code else {
        return Ok(None);
    };

    let attributes_cbor: Vec<u8> = row.get(offset + 3)?;
    let attributes: BTreeMap<String, String> = if attributes_cbor.is_empty() {
        BTreeMap::new()
    } else {
        ciborium::from_reader(&attributes_cbor[..])
            .map_err(|e| conversion_error(offset + 3, Type::Blob, e))?
    };

    Ok(Some(UnitReference {
        code,
        remote_id: row.get(offset + 1)?,
        revision: row.get::<_, i64>(offset + 2)? as u64,
        attributes,
        location: row.get(offset + 4)?,
        status: UnitStatus::from_u16(row.get(offset + 5)?),
        updated_at: row.get(offset + 6)?,
    }))
}

fn context_param(context: Option<OperationContext>) -> Option<i64> {
    context.map(|c| c.to_u16() as i64)
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_unit(&self, code: &str) -> Result<Option<UnitReference>> {
        let code = code.to_string();

        run(&self.reader, move |conn| {
            let sql = format!("SELECT {} FROM units u WHERE u.code = ?1", UNIT_COLUMNS);
            let unit = conn
                .query_row(&sql, params![code], |row| row_to_unit(row, 0))
                .optional()?;
            Ok(unit.flatten())
        })
        .await
    }

    async fn apply_unit_batch(&self, batch: &ReplicaBatch) -> Result<BatchOutcome> {
        // Encode up front so a bad batch fails before touching the database.
        let mut prepared = Vec::with_capacity(batch.changes.len());
        for change in &batch.changes {
            let encoded = match change {
                UnitChange::Upsert(unit) => Some(encode_attributes(&unit.attributes)?),
                UnitChange::Remove { .. } => None,
            };
            prepared.push((change.clone(), encoded));
        }
        let cursor = batch.cursor;

        run(&self.writer, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: i64 =
                tx.query_row("SELECT cursor FROM sync_cursor WHERE id = 1", [], |row| {
                    row.get(0)
                })?;
            if cursor <= current as u64 {
                return Ok(BatchOutcome::Stale {
                    current: current as u64,
                });
            }

            let now = crate::now_millis();
            let mut upserted = 0;
            let mut removed = 0;
            {
                let mut upsert = tx.prepare(
                    "INSERT INTO units (
                        code, remote_id, revision, attributes, location, status,
                        updated_at, replicated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(code) DO UPDATE SET
                        remote_id = excluded.remote_id,
                        revision = excluded.revision,
                        attributes = excluded.attributes,
                        location = excluded.location,
                        status = excluded.status,
                        updated_at = excluded.updated_at,
                        replicated_at = excluded.replicated_at",
                )?;
                let mut remove = tx.prepare("DELETE FROM units WHERE code = ?1")?;

                for (change, attributes) in &prepared {
                    match (change, attributes) {
                        (UnitChange::Upsert(unit), Some(attributes)) => {
                            upsert.execute(params![
                                unit.code,
                                unit.remote_id,
                                unit.revision as i64,
                                attributes,
                                unit.location,
                                unit.status.to_u16() as i64,
                                unit.updated_at,
                                now,
                            ])?;
                            upserted += 1;
                        }
                        (UnitChange::Remove { code }, _) => {
                            removed += remove.execute(params![code])?;
                        }
                        (UnitChange::Upsert(unit), None) => {
                            return Err(StoreError::InvalidData(format!(
                                "unit {} has no encoded attributes",
                                unit.code
                            )));
                        }
                    }
                }
            }

            tx.execute(
                "UPDATE sync_cursor SET cursor = ?1, updated_at = ?2 WHERE id = 1",
                params![cursor as i64, now],
            )?;
            tx.commit()?;

            Ok(BatchOutcome::Applied { upserted, removed })
        })
        .await
    }

    async fn sync_cursor(&self) -> Result<u64> {
        run(&self.reader, |conn| {
            let cursor: i64 =
                conn.query_row("SELECT cursor FROM sync_cursor WHERE id = 1", [], |row| {
                    row.get(0)
                })?;
            Ok(cursor as u64)
        })
        .await
    }

    async fn insert_capture(&self, record: &CaptureRecord) -> Result<InsertResult> {
        let record = record.clone();

        run(&self.writer, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            // Check if the record already exists by id
            let existing_by_id: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT capture_id FROM captures WHERE capture_id = ?1",
                    params![record.id.0.as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            if existing_by_id.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            // Check if this code was already captured in this context
            let existing_by_key: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT capture_id FROM captures WHERE code = ?1 AND context = ?2",
                    params![record.code.as_str(), record.context.to_u16() as i64],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_bytes) = existing_by_key {
                let existing = CaptureId::try_from(existing_bytes.as_slice())
                    .map_err(|e| StoreError::InvalidData(format!("capture_id: {}", e)))?;
                return Ok(InsertResult::Conflict { existing });
            }

            let exported_at = match record.export {
                ExportState::Pending => None,
                ExportState::Exported { at } => Some(at),
            };

            tx.execute(
                "INSERT INTO captures (
                    capture_id, code, context, captured_at,
                    matched_remote_id, matched_revision, exported_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.0.as_slice(),
                    record.code.as_str(),
                    record.context.to_u16() as i64,
                    record.captured_at,
                    record.matched_unit.map(|m| m.remote_id),
                    record.matched_unit.map(|m| m.revision as i64),
                    exported_at,
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_capture(&self, id: &CaptureId) -> Result<Option<CaptureRecord>> {
        let id = *id;

        run(&self.reader, move |conn| {
            let sql = format!(
                "SELECT {} FROM captures c WHERE c.capture_id = ?1",
                CAPTURE_COLUMNS
            );
            conn.query_row(&sql, params![id.0.as_slice()], row_to_capture)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn find_capture(
        &self,
        code: &str,
        context: OperationContext,
    ) -> Result<Option<CaptureRecord>> {
        let code = code.to_string();

        run(&self.reader, move |conn| {
            let sql = format!(
                "SELECT {} FROM captures c WHERE c.code = ?1 AND c.context = ?2",
                CAPTURE_COLUMNS
            );
            conn.query_row(
                &sql,
                params![code, context.to_u16() as i64],
                row_to_capture,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<CaptureRecord>> {
        run(&self.reader, move |conn| {
            let sql = format!(
                "SELECT {} FROM captures c
                 WHERE (?1 IS NULL OR c.context = ?1)
                 ORDER BY c.captured_at, c.capture_id",
                CAPTURE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![context_param(context)], row_to_capture)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn resolve_captures(
        &self,
        context: Option<OperationContext>,
    ) -> Result<Vec<ResolvedCapture>> {
        run(&self.reader, move |conn| {
            // One statement, one snapshot: the join never mixes two batches.
            let sql = format!(
                "SELECT {}, {} FROM captures c
                 LEFT JOIN units u ON u.code = c.code
                 WHERE (?1 IS NULL OR c.context = ?1)
                 ORDER BY c.captured_at, c.capture_id",
                CAPTURE_COLUMNS, UNIT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let resolved = stmt
                .query_map(params![context_param(context)], |row| {
                    Ok(ResolvedCapture {
                        record: row_to_capture(row)?,
                        unit: row_to_unit(row, 7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(resolved)
        })
        .await
    }

    async fn pending_exports(&self, limit: usize) -> Result<Vec<CaptureRecord>> {
        run(&self.reader, move |conn| {
            let sql = format!(
                "SELECT {} FROM captures c
                 WHERE c.exported_at IS NULL
                 ORDER BY c.captured_at, c.capture_id
                 LIMIT ?1",
                CAPTURE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![limit as i64], row_to_capture)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn mark_exported(&self, ids: &[CaptureId], at: i64) -> Result<usize> {
        let ids = ids.to_vec();

        run(&self.writer, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut changed = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE captures SET exported_at = ?2
                     WHERE capture_id = ?1 AND exported_at IS NULL",
                )?;
                for id in &ids {
                    changed += stmt.execute(params![id.0.as_slice(), at])?;
                }
            }
            tx.commit()?;
            Ok(changed)
        })
        .await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        run(&self.reader, |conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM units),
                    (SELECT COUNT(*) FROM captures),
                    (SELECT COUNT(*) FROM captures WHERE exported_at IS NULL)",
                [],
                |row| {
                    Ok(StoreCounts {
                        units: row.get::<_, i64>(0)? as usize,
                        captures: row.get::<_, i64>(1)? as usize,
                        pending: row.get::<_, i64>(2)? as usize,
                    })
                },
            )?;
            Ok(counts)
        })
        .await
    }
}
