//! Bale identifier validation.
//!
//! A bale identifier is exactly [`CODE_LENGTH`] Code 39 symbols, the last of
//! which is the modulo-43 check character of the others. Validation is a pure
//! function of the normalized characters: no prior scans, device state or
//! network state take part.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::{check_character, ordinal, CODE_LENGTH};
use crate::error::InvalidReason;
use crate::normalize::NormalizedCode;

/// A normalized code that passed validation.
///
/// Only [`validate`] and [`BaleCode::parse`] construct one, so holding a
/// `BaleCode` is proof the check character matched.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BaleCode(String);

impl BaleCode {
    /// Validate a string that is already normalized (e.g. read back from storage).
    pub fn parse(s: &str) -> Result<Self, InvalidReason> {
        check(s)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The nine data characters.
    pub fn data(&self) -> &str {
        // All symbols are ASCII, so byte indexing is character indexing.
        &self.0[..CODE_LENGTH - 1]
    }

    /// The trailing check character.
    pub fn check(&self) -> char {
        self.0.as_bytes()[CODE_LENGTH - 1] as char
    }
}

impl<'de> Deserialize<'de> for BaleCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BaleCode::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for BaleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaleCode({})", self.0)
    }
}

impl fmt::Display for BaleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BaleCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of validating a normalized code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid(BaleCode),
    Invalid(InvalidReason),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            ValidationResult::Valid(_) => None,
            ValidationResult::Invalid(reason) => Some(*reason),
        }
    }
}

/// Validate a normalized code.
pub fn validate(code: &NormalizedCode) -> ValidationResult {
    match check(code.as_str()) {
        Ok(()) => ValidationResult::Valid(BaleCode(code.as_str().to_string())),
        Err(reason) => ValidationResult::Invalid(reason),
    }
}

fn check(s: &str) -> Result<(), InvalidReason> {
    let length = s.chars().count();
    if length != CODE_LENGTH {
        return Err(InvalidReason::WrongLength { length });
    }

    let (data_end, found) = s
        .char_indices()
        .last()
        .ok_or(InvalidReason::WrongLength { length: 0 })?;

    // Data characters are reported first by `check_character`.
    let expected = check_character(&s[..data_end])?;

    if ordinal(found).is_none() {
        return Err(InvalidReason::UnknownCharacter {
            position: CODE_LENGTH - 1,
            character: found,
        });
    }

    if found != expected {
        return Err(InvalidReason::ChecksumMismatch { expected, found });
    }

    Ok(())
}
