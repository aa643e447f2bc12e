//! # Bale Capture Sync
//!
//! Moves data between the local reconciliation store and the remote system.
//! Nothing on the capture path waits for anything in this crate.
//!
//! ## Overview
//!
//! - **Inbound**: a [`Replicator`] pulls unit changes from a [`UnitSource`]
//!   and applies each batch atomically to the store.
//! - **Outbound**: an [`Exporter`] hands pending capture records to an
//!   [`ExportSink`] and flips acknowledged ones to exported.
//! - **Link status**: both report reachability into a [`LinkMonitor`] that UI
//!   code can watch.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bale_capture_store::MemoryStore;
//! use bale_capture_sync::{MemorySource, Replicator, SyncConfig};
//!
//! async fn example() {
//!     let store = Arc::new(MemoryStore::new());
//!     let source = MemorySource::new();
//!
//!     let replicator = Replicator::new(store, source, SyncConfig::default());
//!     let report = replicator.drain().await.unwrap();
//!     println!("cursor now {}", report.cursor);
//! }
//! ```

pub mod config;
pub mod error;
pub mod inbound;
pub mod link;
pub mod outbound;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use inbound::{memory::MemorySource, ReplicationReport, Replicator, UnitSource};
pub use link::{LinkMonitor, LinkStatus};
pub use outbound::{memory::MemorySink, ExportEnvelope, ExportReport, ExportSink, Exporter};
