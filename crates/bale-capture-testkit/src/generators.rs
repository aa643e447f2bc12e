//! Proptest generators for property-based testing.

use proptest::prelude::*;

use bale_capture_core::{
    append_check_character, ordinal, Platform, ScanSource, Symbology, UnitReference, UnitStatus,
    ALPHABET,
};

/// Any Code 39 symbol.
pub fn symbol() -> impl Strategy<Value = char> {
    prop::sample::select(ALPHABET.to_vec()).prop_map(char::from)
}

/// Any Code 39 symbol except space, which normalization trims at the edges.
pub fn solid_symbol() -> impl Strategy<Value = char> {
    symbol().prop_filter("space", |c| *c != ' ')
}

/// Nine data characters.
pub fn data_part() -> impl Strategy<Value = String> {
    prop::collection::vec(symbol(), 9).prop_map(String::from_iter)
}

/// A ten-character code with a correct check character.
pub fn valid_code() -> impl Strategy<Value = String> {
    data_part().prop_filter_map("alphabet", |data| append_check_character(&data).ok())
}

/// A valid code that survives normalization unchanged.
pub fn scannable_code() -> impl Strategy<Value = String> {
    valid_code().prop_filter("edge space", |code| code.trim() == code)
}

/// A string of solid symbols whose length is anything but ten.
pub fn wrong_length_payload() -> impl Strategy<Value = String> {
    prop::collection::vec(solid_symbol(), 0..24)
        .prop_filter("length 10", |v| v.len() != 10)
        .prop_map(String::from_iter)
}

/// A character that is not a Code 39 symbol and not stripped by normalization.
pub fn foreign_char() -> impl Strategy<Value = char> {
    any::<char>().prop_filter("alphabet, sentinel or whitespace", |c| {
        ordinal(*c).is_none() && *c != '*' && !c.is_whitespace()
    })
}

/// Sentinels and whitespace a scanner may wrap a payload in.
pub fn scan_noise() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!['*', ' ', '\t', '\r', '\n']), 0..4)
        .prop_map(String::from_iter)
}

pub fn symbology() -> impl Strategy<Value = Symbology> {
    prop_oneof![
        Just(Symbology::Code39),
        Just(Symbology::Code128),
        Just(Symbology::Ean13),
        Just(Symbology::UpcA),
        Just(Symbology::QrCode),
        Just(Symbology::DataMatrix),
        Just(Symbology::Other),
    ]
}

pub fn platform() -> impl Strategy<Value = Platform> {
    prop_oneof![Just(Platform::Android), Just(Platform::Ios), Just(Platform::Other)]
}

pub fn scan_source() -> impl Strategy<Value = ScanSource> {
    (symbology(), platform()).prop_map(|(s, p)| ScanSource::new(s, p))
}

/// A unit carrying a valid code.
pub fn unit_reference() -> impl Strategy<Value = UnitReference> {
    (
        valid_code(),
        1i64..=1_000_000,
        1u64..=50,
        prop::sample::select(vec!["A", "B", "C"]),
        prop::option::of("[a-z]{3}-[0-9]{1,2}"),
        prop_oneof![
            Just(UnitStatus::InStock),
            Just(UnitStatus::Dispatched),
            Just(UnitStatus::Reclassified),
        ],
    )
        .prop_map(|(code, remote_id, revision, grade, location, status)| {
            let mut unit = UnitReference::new(code, remote_id)
                .with_revision(revision)
                .with_attribute("grade", grade)
                .with_status(status);
            unit.location = location;
            unit
        })
}
