//! CaptureRecord: the durable artifact of one accepted scan.
//!
//! Records are immutable once persisted. The only attribute set after
//! construction is the matcher's [`UnitMatch`], and it is set before the
//! record reaches the store. Corrections are new records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::CaptureId;
use crate::unit::UnitReference;
use crate::validation::BaleCode;

/// Domain tag mixed into every capture id.
pub const CAPTURE_ID_DOMAIN: &[u8] = b"bale-capture-v1:";

/// The workflow a capture was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationContext {
    Receiving,
    Dispatch,
    Reclassification,
    Stocktake,
}

impl OperationContext {
    pub const ALL: [OperationContext; 4] = [
        OperationContext::Receiving,
        OperationContext::Dispatch,
        OperationContext::Reclassification,
        OperationContext::Stocktake,
    ];

    /// Stable discriminant for storage.
    pub fn to_u16(self) -> u16 {
        match self {
            OperationContext::Receiving => 1,
            OperationContext::Dispatch => 2,
            OperationContext::Reclassification => 3,
            OperationContext::Stocktake => 4,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(OperationContext::Receiving),
            2 => Some(OperationContext::Dispatch),
            3 => Some(OperationContext::Reclassification),
            4 => Some(OperationContext::Stocktake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationContext::Receiving => "receiving",
            OperationContext::Dispatch => "dispatch",
            OperationContext::Reclassification => "reclassification",
            OperationContext::Stocktake => "stocktake",
        }
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u16> for OperationContext {
    type Error = CoreError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_u16(value).ok_or(CoreError::UnknownContext(value))
    }
}

/// The unit the matcher found when the capture was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMatch {
    pub remote_id: i64,
    pub revision: u64,
}

impl From<&UnitReference> for UnitMatch {
    fn from(unit: &UnitReference) -> Self {
        Self {
            remote_id: unit.remote_id,
            revision: unit.revision,
        }
    }
}

/// Whether the outbound sync has taken the record yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportState {
    #[default]
    Pending,
    Exported {
        at: i64,
    },
}

impl ExportState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ExportState::Pending)
    }
}

/// One accepted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: CaptureId,
    pub code: BaleCode,
    pub context: OperationContext,
    /// Unix milliseconds.
    pub captured_at: i64,
    pub matched_unit: Option<UnitMatch>,
    pub export: ExportState,
}

impl CaptureRecord {
    /// Build a pending record with no unit match.
    pub fn new(code: BaleCode, context: OperationContext, captured_at: i64) -> Self {
        let id = Self::derive_id(&code, context, captured_at);
        Self {
            id,
            code,
            context,
            captured_at,
            matched_unit: None,
            export: ExportState::Pending,
        }
    }

    /// Attach the matcher's finding.
    pub fn with_match(mut self, matched: Option<UnitMatch>) -> Self {
        self.matched_unit = matched;
        self
    }

    /// Blake3(domain || context || code || captured_at).
    pub fn derive_id(code: &BaleCode, context: OperationContext, captured_at: i64) -> CaptureId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CAPTURE_ID_DOMAIN);
        hasher.update(&context.to_u16().to_be_bytes());
        hasher.update(code.as_str().as_bytes());
        hasher.update(&captured_at.to_be_bytes());
        CaptureId(*hasher.finalize().as_bytes())
    }

    pub fn is_matched(&self) -> bool {
        self.matched_unit.is_some()
    }
}

/// A capture joined with the unit currently known for its code.
///
/// The unit is looked up when the view is built, not when the capture was
/// made, so units replicated after the scan still show up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCapture {
    pub record: CaptureRecord,
    pub unit: Option<UnitReference>,
}

impl ResolvedCapture {
    /// Matched now but not when captured: the unit arrived late.
    pub fn matched_late(&self) -> bool {
        self.record.matched_unit.is_none() && self.unit.is_some()
    }
}
