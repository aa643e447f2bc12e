//! Strong identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte capture identifier: Blake3 over the capture's identity fields.
///
/// Re-deriving the id from the same code, context and timestamp yields the
/// same value, which is what makes re-inserting a record idempotent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureId(pub [u8; 32]);

impl CaptureId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes as hex; enough to tell captures apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Debug for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CaptureId({})", self.short())
    }
}

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Decodes a stored id column.
impl TryFrom<&[u8]> for CaptureId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        slice.try_into().map(CaptureId)
    }
}
