//! Barcode normalization: strip scanner artifacts before validation.
//!
//! Normalization only removes delimiters. It never rewrites the payload and
//! it is idempotent for a fixed [`ScanSource`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbology reported by the capture device for a decoded scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    Code39,
    Code128,
    Ean13,
    UpcA,
    QrCode,
    DataMatrix,
    Other,
}

/// Platform the capture device runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    #[default]
    Other,
}

/// Where a scan came from: the key for device-specific normalization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanSource {
    pub symbology: Symbology,
    pub platform: Platform,
}

impl ScanSource {
    pub const fn new(symbology: Symbology, platform: Platform) -> Self {
        Self {
            symbology,
            platform,
        }
    }
}

/// One decoded scan as delivered by the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub symbology: Symbology,
    pub payload: String,
}

impl ScanEvent {
    pub fn new(symbology: Symbology, payload: impl Into<String>) -> Self {
        Self {
            symbology,
            payload: payload.into(),
        }
    }
}

/// A scanned payload with sentinels and device prefixes removed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NormalizedCode(String);

impl NormalizedCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for NormalizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NormalizedCode({:?})", self.0)
    }
}

impl fmt::Display for NormalizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Start/stop sentinel some linear symbologies leave in the raw output.
pub const SENTINEL: char = '*';

/// Normalize a raw payload from the given source.
pub fn normalize(raw: &str, source: ScanSource) -> NormalizedCode {
    // Sentinels and whitespace may interleave ("* *ABC* "), so strip both
    // classes in a single pass to keep the result a fixed point.
    let trimmed = raw.trim_matches(|c: char| c == SENTINEL || c.is_whitespace());

    let stripped = strip_redundant_leading_zero(trimmed, source).unwrap_or(trimmed);
    NormalizedCode(stripped.to_string())
}

/// iOS reports UPC-A labels as EAN-13 with a redundant leading zero.
///
/// Applies only to exactly 13 ASCII digits starting with '0' from an EAN-13
/// scan on iOS.
fn strip_redundant_leading_zero(payload: &str, source: ScanSource) -> Option<&str> {
    if source.symbology != Symbology::Ean13 || source.platform != Platform::Ios {
        return None;
    }
    if payload.len() != 13 || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    payload.strip_prefix('0')
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE39_ANDROID: ScanSource = ScanSource::new(Symbology::Code39, Platform::Android);
    const EAN13_IOS: ScanSource = ScanSource::new(Symbology::Ean13, Platform::Ios);

    #[test]
    fn test_strips_sentinels() {
        assert_eq!(
            normalize("*1234567892*", CODE39_ANDROID).as_str(),
            "1234567892"
        );
        assert_eq!(normalize("***AB***", CODE39_ANDROID).as_str(), "AB");
    }

    #[test]
    fn test_strips_whitespace() {
        assert_eq!(
            normalize("  1234567892\r\n", CODE39_ANDROID).as_str(),
            "1234567892"
        );
    }

    #[test]
    fn test_strips_interleaved_runs() {
        assert_eq!(normalize(" * *AB C* \n", CODE39_ANDROID).as_str(), "AB C");
    }

    #[test]
    fn test_keeps_interior_sentinels() {
        assert_eq!(normalize("*AB*CD*", CODE39_ANDROID).as_str(), "AB*CD");
    }

    #[test]
    fn test_unchanged_when_clean() {
        assert_eq!(normalize("HELLO", CODE39_ANDROID).as_str(), "HELLO");
        assert_eq!(normalize("", CODE39_ANDROID).as_str(), "");
        assert_eq!(normalize("***", CODE39_ANDROID).as_str(), "");
    }

    #[test]
    fn test_ean13_ios_leading_zero() {
        assert_eq!(normalize("0123456789012", EAN13_IOS).as_str(), "123456789012");
    }

    #[test]
    fn test_leading_zero_rule_is_narrow() {
        // Wrong platform
        let android = ScanSource::new(Symbology::Ean13, Platform::Android);
        assert_eq!(normalize("0123456789012", android).as_str(), "0123456789012");

        // Wrong symbology
        let upc = ScanSource::new(Symbology::UpcA, Platform::Ios);
        assert_eq!(normalize("0123456789012", upc).as_str(), "0123456789012");

        // Wrong length
        assert_eq!(normalize("012345678901", EAN13_IOS).as_str(), "012345678901");

        // Does not start with zero
        assert_eq!(normalize("1123456789012", EAN13_IOS).as_str(), "1123456789012");

        // Not numeric
        assert_eq!(normalize("0*23456789012", EAN13_IOS).as_str(), "0*23456789012");
    }

    #[test]
    fn test_leading_zero_applies_after_trim() {
        assert_eq!(
            normalize(" 0123456789012\n", EAN13_IOS).as_str(),
            "123456789012"
        );
    }

    #[test]
    fn test_idempotent_on_quirk() {
        let once = normalize("0000000000000", EAN13_IOS);
        let twice = normalize(once.as_str(), EAN13_IOS);
        assert_eq!(once, twice);
        assert_eq!(once.char_len(), 12);
    }

    #[test]
    fn test_platform_from_config_string() {
        let p: Platform = serde_json::from_str("\"ios\"").unwrap();
        assert_eq!(p, Platform::Ios);
        let s: Symbology = serde_json::from_str("\"ean13\"").unwrap();
        assert_eq!(s, Symbology::Ean13);
    }
}
