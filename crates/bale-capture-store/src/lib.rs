//! # Bale Capture Store
//!
//! The local reconciliation store: replicated unit references and locally
//! captured records, behind the async [`Store`] trait.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage (WAL, separate reader)
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a capture record
//! - [`BatchOutcome`] - Result of applying a replication batch
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bale_capture_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("capture.db").unwrap();
//!
//!     // Exact-match lookup, never touches the network
//!     let unit = store.find_unit("1234567892").await.unwrap();
//!     println!("{:?}", unit);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic batches**: a replication batch is visible entirely or not at all
//! - **Idempotent inserts**: inserting the same record twice returns `AlreadyExists`
//! - **One capture per code and context**: a second record returns `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{BatchOutcome, InsertResult, Store, StoreCounts};

/// Current time in Unix milliseconds, the unit every stored timestamp uses.
///
/// A clock set before the epoch reads as 0.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
