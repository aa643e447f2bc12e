//! # Bale Capture Testkit
//!
//! Testing utilities for bale capture.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Check characters other label printers must agree with
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Codes, units, scans and a ready-made store with sync peers
//! - **Faults**: Store wrappers that fail lookups or park inserts on demand
//!
//! ## Golden Vectors
//!
//! ```rust
//! use bale_capture_core::check_character;
//! use bale_capture_testkit::vectors::check_vectors;
//!
//! for vector in check_vectors().unwrap() {
//!     assert_eq!(check_character(&vector.data), Ok(vector.check));
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use bale_capture_testkit::generators::scannable_code;
//!
//! proptest! {
//!     #[test]
//!     fn accepted(code in scannable_code()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Faults
//!
//! ```rust
//! use bale_capture_store::MemoryStore;
//! use bale_capture_testkit::faults::{Fault, FlakyStore};
//!
//! // The first two lookups fail with a transient error.
//! let store = FlakyStore::new(MemoryStore::new(), 2, Fault::Transient);
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use faults::{Fault, FlakyStore, GatedStore, Stage};
pub use fixtures::TestFixture;
