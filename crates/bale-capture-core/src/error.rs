//! Error types for the Bale Capture Core.

use thiserror::Error;

/// Errors raised while decoding core values from storage or the wire.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown operation context discriminant: {0}")]
    UnknownContext(u16),

    #[error("invalid capture id: {0}")]
    InvalidCaptureId(String),

    #[error("stored code {code:?} is not a valid bale code: {reason}")]
    InvalidStoredCode { code: String, reason: InvalidReason },

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Why a normalized code is not a trustworthy bale identifier.
///
/// These are outcomes, not failures of the caller: the capture session turns
/// them into user feedback and never propagates them as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("expected 10 characters, got {length}")]
    WrongLength { length: usize },

    #[error("character {character:?} at position {position} is not a Code 39 symbol")]
    UnknownCharacter { position: usize, character: char },

    #[error("check character mismatch: expected {expected:?}, found {found:?}")]
    ChecksumMismatch { expected: char, found: char },
}

impl InvalidReason {
    /// Whether the user should be told to try scanning the same label again.
    ///
    /// Only a checksum mismatch looks like a misread; the other reasons mean
    /// the label is simply not a bale identifier.
    pub fn suggests_rescan(&self) -> bool {
        matches!(self, InvalidReason::ChecksumMismatch { .. })
    }

    /// Short stable tag for logs and persisted diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            InvalidReason::WrongLength { .. } => "wrong_length",
            InvalidReason::UnknownCharacter { .. } => "unknown_character",
            InvalidReason::ChecksumMismatch { .. } => "checksum_mismatch",
        }
    }
}
