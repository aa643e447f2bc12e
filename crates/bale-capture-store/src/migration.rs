//! Schema migrations.
//!
//! `MIGRATIONS[i]` takes the schema from version `i` to `i + 1`. Applied
//! versions are recorded in `schema_migrations`; pending ones run in a single
//! transaction on open.

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::{Result, StoreError};

const V1_INITIAL: &str = r#"
    -- Replicated units, written only by inbound sync
    CREATE TABLE units (
        code TEXT PRIMARY KEY,            -- exact barcode, match key
        remote_id INTEGER NOT NULL,
        revision INTEGER NOT NULL,
        attributes BLOB NOT NULL,         -- CBOR map
        location TEXT,
        status INTEGER NOT NULL,          -- UnitStatus as u16
        updated_at INTEGER NOT NULL,      -- remote update time (Unix ms)
        replicated_at INTEGER NOT NULL
    );

    CREATE TABLE captures (
        capture_id BLOB PRIMARY KEY,      -- 32 bytes
        code TEXT NOT NULL,
        context INTEGER NOT NULL,         -- OperationContext as u16
        captured_at INTEGER NOT NULL,     -- Unix ms
        matched_remote_id INTEGER,
        matched_revision INTEGER,
        exported_at INTEGER,              -- NULL while pending export
        UNIQUE(code, context)
    );

    CREATE TABLE sync_cursor (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        cursor INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    INSERT INTO sync_cursor (id, cursor, updated_at) VALUES (1, 0, 0);

    CREATE INDEX idx_captures_pending ON captures(captured_at) WHERE exported_at IS NULL;
    CREATE INDEX idx_captures_context ON captures(context, captured_at);
"#;

const MIGRATIONS: &[&str] = &[V1_INITIAL];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {} is newer than this build ({})",
            current, CURRENT_VERSION
        )));
    }
    if current == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (from, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let to = from as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("v{}: {}", to, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![to, crate::now_millis()],
        )?;
    }
    tx.commit()?;

    info!(from = current, to = CURRENT_VERSION, "schema_migrated");
    Ok(())
}
