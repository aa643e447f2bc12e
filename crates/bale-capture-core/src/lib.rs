//! # Bale Capture Core
//!
//! Pure primitives for bale capture: barcode normalization, check-character
//! validation, and the capture data model.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! safe to call from any thread, any number of times, with identical results.
//!
//! ## Key Types
//!
//! - [`NormalizedCode`] - A scanned payload with scanner artifacts removed
//! - [`BaleCode`] - A code that passed the modulo-43 check
//! - [`CaptureRecord`] - The durable artifact of an accepted scan
//! - [`UnitReference`] - A replicated description of a known unit
//!
//! ## Pipeline
//!
//! ```rust
//! use bale_capture_core::{normalize, validate, Platform, ScanSource, Symbology, ValidationResult};
//!
//! let source = ScanSource::new(Symbology::Code39, Platform::Android);
//! let normalized = normalize("*1234567892*", source);
//! assert!(matches!(validate(&normalized), ValidationResult::Valid(_)));
//! ```

pub mod capture;
pub mod checksum;
pub mod error;
pub mod normalize;
pub mod types;
pub mod unit;
pub mod validation;

pub use capture::{
    CaptureRecord, ExportState, OperationContext, ResolvedCapture, UnitMatch, CAPTURE_ID_DOMAIN,
};
pub use checksum::{append_check_character, check_character, ordinal, ALPHABET, CODE_LENGTH};
pub use error::{CoreError, InvalidReason};
pub use normalize::{normalize, NormalizedCode, Platform, ScanEvent, ScanSource, Symbology};
pub use types::CaptureId;
pub use unit::{ReplicaBatch, UnitChange, UnitReference, UnitStatus};
pub use validation::{validate, BaleCode, ValidationResult};
