//! UnitReference: the local replica of a unit known to the remote system.
//!
//! Units are written only by inbound replication. The capture path reads them
//! and never writes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a unit as reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    InStock,
    Dispatched,
    Reclassified,
    /// A status this client does not know yet. Kept verbatim.
    Unknown(u16),
}

impl UnitStatus {
    pub fn to_u16(self) -> u16 {
        match self {
            UnitStatus::InStock => 1,
            UnitStatus::Dispatched => 2,
            UnitStatus::Reclassified => 3,
            UnitStatus::Unknown(v) => v,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => UnitStatus::InStock,
            2 => UnitStatus::Dispatched,
            3 => UnitStatus::Reclassified,
            v => UnitStatus::Unknown(v),
        }
    }
}

/// A remotely sourced description of a physical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReference {
    /// The unit's barcode. Matching is exact equality on this field.
    pub code: String,
    /// Primary key on the remote system.
    pub remote_id: i64,
    /// Remote revision, increasing with every remote update.
    pub revision: u64,
    /// Classification attributes (grade, weight class, lot, ...).
    pub attributes: BTreeMap<String, String>,
    pub location: Option<String>,
    pub status: UnitStatus,
    /// Remote update time, Unix milliseconds.
    pub updated_at: i64,
}

impl UnitReference {
    pub fn new(code: impl Into<String>, remote_id: i64) -> Self {
        Self {
            code: code.into(),
            remote_id,
            revision: 1,
            attributes: BTreeMap::new(),
            location: None,
            status: UnitStatus::InStock,
            updated_at: 0,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_status(mut self, status: UnitStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }
}

/// One change carried by a replication batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitChange {
    Upsert(UnitReference),
    Remove { code: String },
}

impl UnitChange {
    pub fn code(&self) -> &str {
        match self {
            UnitChange::Upsert(unit) => &unit.code,
            UnitChange::Remove { code } => code,
        }
    }
}

/// A set of unit changes applied atomically, tagged with the source cursor
/// reached after applying them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicaBatch {
    pub cursor: u64,
    pub changes: Vec<UnitChange>,
}

impl ReplicaBatch {
    pub fn new(cursor: u64, changes: Vec<UnitChange>) -> Self {
        Self { cursor, changes }
    }

    pub fn upserts(cursor: u64, units: impl IntoIterator<Item = UnitReference>) -> Self {
        Self {
            cursor,
            changes: units.into_iter().map(UnitChange::Upsert).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
