//! Golden check-character vectors.
//!
//! Labels printed elsewhere must validate here, so the vectors live in a
//! plain JSON file that other implementations can read too.

use serde::{Deserialize, Serialize};

/// Raw JSON of the check-character vectors.
pub const CHECK_CHARACTERS_JSON: &str = include_str!("../vectors/check_characters.json");

/// A golden check-character vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVector {
    /// Human-readable name for the vector.
    pub name: String,
    /// The nine data characters.
    pub data: String,
    /// Expected modulo-43 check character.
    pub check: char,
}

impl CheckVector {
    /// The full ten-character code.
    pub fn code(&self) -> String {
        let mut code = self.data.clone();
        code.push(self.check);
        code
    }

    /// Whether the code reaches the validator unchanged after normalization.
    ///
    /// Whitespace at either end is trimmed as a scanner artifact, so a code
    /// that starts or ends with a space cannot be scanned.
    pub fn is_scannable(&self) -> bool {
        let code = self.code();
        code.trim() == code
    }
}

/// Get all check-character vectors.
pub fn check_vectors() -> serde_json::Result<Vec<CheckVector>> {
    serde_json::from_str(CHECK_CHARACTERS_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_capture_core::{
        check_character, normalize, validate, InvalidReason, Platform, ScanSource, Symbology,
        ValidationResult,
    };
    use std::collections::HashSet;

    const SOURCE: ScanSource = ScanSource::new(Symbology::Code39, Platform::Android);

    #[test]
    fn test_vectors_parse_with_unique_names() {
        let vectors = check_vectors().unwrap();
        assert!(vectors.len() >= 10);
        let names: HashSet<_> = vectors.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names.len(), vectors.len());
    }

    #[test]
    fn test_check_characters_match() {
        for vector in check_vectors().unwrap() {
            assert_eq!(
                check_character(&vector.data),
                Ok(vector.check),
                "vector {:?}",
                vector.name
            );
        }
    }

    #[test]
    fn test_scannable_vectors_validate() {
        for vector in check_vectors().unwrap().into_iter().filter(|v| v.is_scannable()) {
            let normalized = normalize(&format!("*{}*", vector.code()), SOURCE);
            match validate(&normalized) {
                ValidationResult::Valid(code) => assert_eq!(code.as_str(), vector.code()),
                other => panic!("vector {:?}: {:?}", vector.name, other),
            }
        }
    }

    #[test]
    fn test_space_check_character_is_lost_to_trimming() {
        let vector = check_vectors()
            .unwrap()
            .into_iter()
            .find(|v| v.check == ' ')
            .unwrap();
        assert!(!vector.is_scannable());

        let normalized = normalize(&vector.code(), SOURCE);
        assert_eq!(
            validate(&normalized).reason(),
            Some(InvalidReason::WrongLength { length: 9 })
        );
    }
}
