//! Code 39 modulo-43 check character arithmetic.
//!
//! Every symbol of the Code 39 alphabet has an ordinal 0..=42. The check
//! character of a data string is the symbol whose ordinal is the sum of the
//! data ordinals, modulo 43.
//!
//! A single substituted character always changes the sum by a non-zero amount
//! below 43, so it is always caught. Two data characters swapped, or two
//! substitutions whose deltas cancel, are not.

use crate::error::InvalidReason;

/// The 43 Code 39 symbols, in ordinal order.
pub const ALPHABET: &[u8; 43] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-. $/+%";

/// Modulus of the check character scheme.
pub const MODULUS: u32 = 43;

/// Total length of a bale identifier, check character included.
pub const CODE_LENGTH: usize = 10;

/// Number of data characters preceding the check character.
pub const DATA_LENGTH: usize = CODE_LENGTH - 1;

/// Ordinal of a symbol in [`ALPHABET`], or `None` if it is not a Code 39 symbol.
pub fn ordinal(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        'A'..='Z' => Some(c as u32 - 'A' as u32 + 10),
        '-' => Some(36),
        '.' => Some(37),
        ' ' => Some(38),
        '$' => Some(39),
        '/' => Some(40),
        '+' => Some(41),
        '%' => Some(42),
        _ => None,
    }
}

/// Symbol at the given ordinal (taken modulo 43).
pub fn symbol(ordinal: u32) -> char {
    ALPHABET[(ordinal % MODULUS) as usize] as char
}

/// Compute the check character for a run of data characters.
///
/// Fails with `UnknownCharacter` on the first character outside the alphabet.
/// The length of `data` is not checked here.
pub fn check_character(data: &str) -> Result<char, InvalidReason> {
    let mut sum = 0u32;
    for (position, character) in data.chars().enumerate() {
        let value = ordinal(character).ok_or(InvalidReason::UnknownCharacter {
            position,
            character,
        })?;
        sum = (sum + value) % MODULUS;
    }
    Ok(symbol(sum))
}

/// Build a full identifier from exactly nine data characters.
pub fn append_check_character(data: &str) -> Result<String, InvalidReason> {
    let length = data.chars().count();
    if length != DATA_LENGTH {
        return Err(InvalidReason::WrongLength { length: length + 1 });
    }
    let check = check_character(data)?;
    let mut code = String::with_capacity(CODE_LENGTH);
    code.push_str(data);
    code.push(check);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_follow_alphabet() {
        for (i, &b) in ALPHABET.iter().enumerate() {
            assert_eq!(ordinal(b as char), Some(i as u32));
            assert_eq!(symbol(i as u32), b as char);
        }
    }

    #[test]
    fn test_outside_alphabet() {
        for c in ['a', 'z', '*', '_', '#', '\t', 'é'] {
            assert_eq!(ordinal(c), None, "{c:?} must not have an ordinal");
        }
    }

    #[test]
    fn test_check_character_of_digits() {
        // 1+2+...+9 = 45, 45 mod 43 = 2
        assert_eq!(check_character("123456789"), Ok('2'));
    }

    #[test]
    fn test_check_character_wraps() {
        // 9 * 42 = 378, 378 mod 43 = 34 -> 'Y'
        assert_eq!(check_character("%%%%%%%%%"), Ok('Y'));
        assert_eq!(check_character("000000000"), Ok('0'));
    }

    #[test]
    fn test_check_character_of_long_input() {
        // 42 * 103_000_000 exceeds u32::MAX; 42 = -1 (mod 43), 103_000_000 = 36.
        let data = "%".repeat(103_000_000);
        assert_eq!(check_character(&data), Ok('7'));
    }

    #[test]
    fn test_check_character_unknown() {
        assert_eq!(
            check_character("12345a789"),
            Err(InvalidReason::UnknownCharacter {
                position: 5,
                character: 'a'
            })
        );
    }

    #[test]
    fn test_append_check_character() {
        assert_eq!(append_check_character("123456789").unwrap(), "1234567892");
        assert!(matches!(
            append_check_character("1234"),
            Err(InvalidReason::WrongLength { length: 5 })
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_check_character_is_in_alphabet(data in "[0-9A-Z. $/+%-]{9}") {
            let check = check_character(&data).unwrap();
            proptest::prop_assert!(ordinal(check).is_some());
        }

        #[test]
        fn prop_sum_shift_changes_check(data in "[0-9A-Y]{9}") {
            // Bumping any one symbol by one ordinal moves the sum by one.
            let bumped: String = data
                .chars()
                .enumerate()
                .map(|(i, c)| if i == 0 { symbol(ordinal(c).unwrap() + 1) } else { c })
                .collect();
            proptest::prop_assert_ne!(check_character(&data), check_character(&bumped));
        }
    }
}
