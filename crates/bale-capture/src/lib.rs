//! # Bale Capture
//!
//! Offline-first capture of bale identifiers from a barcode scanner.
//!
//! ## Overview
//!
//! A scan goes through a fixed pipeline, entirely on the device:
//!
//! - **Normalize**: strip scanner artifacts and device quirks
//! - **Validate**: exactly 10 Code 39 symbols with a matching modulo-43 check
//! - **Match**: exact lookup against locally replicated units
//! - **Persist**: one capture record per accepted scan, readable immediately
//!
//! Replication and export run beside this pipeline and never block it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bale_capture::{CaptureClient, Config, ScanOutcome};
//! use bale_capture::core::{OperationContext, ScanEvent, Symbology};
//!
//! async fn example() {
//!     let client = CaptureClient::open(Config::default()).unwrap();
//!     let session = client.open_session(OperationContext::Receiving);
//!
//!     let event = ScanEvent::new(Symbology::Code39, "*1234567892*");
//!     match session.scan(event).await.unwrap() {
//!         ScanOutcome::Accepted(record) => println!("captured {}", record.code),
//!         other => println!("not captured: {:?}", other),
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `bale_capture::core` - Normalization, validation and the data model
//! - `bale_capture::store` - Store trait, SQLite and in-memory stores
//! - `bale_capture::sync` - Replication, export and link status

pub mod client;
pub mod config;
pub mod error;
pub mod matcher;
pub mod session;
pub mod telemetry;

// Re-export component crates
pub use bale_capture_core as core;
pub use bale_capture_store as store;
pub use bale_capture_sync as sync;

// Re-export main types for convenience
pub use client::CaptureClient;
pub use config::{Config, DeviceConfig, StoreConfig};
pub use error::{CaptureError, PersistenceCause, Result};
pub use matcher::{MatchOutcome, Matcher, RetryPolicy};
pub use session::{
    CaptureConfig, CaptureSession, Feedback, IgnoreReason, ScanOutcome, SessionHandle,
    SessionPhase,
};

// Re-export commonly used core types
pub use bale_capture_core::{
    BaleCode, CaptureRecord, InvalidReason, OperationContext, Platform, ScanEvent, Symbology,
    UnitReference,
};
