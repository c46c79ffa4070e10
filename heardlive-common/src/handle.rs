//! Handle rules shared by sign-up and the profile editor
//!
//! A handle is the public username used in wall URLs: lowercase ASCII
//! letters, digits and underscores only.

use crate::{Error, Result};

/// Shortest accepted handle
pub const HANDLE_MIN_LEN: usize = 3;

/// Longest accepted handle
pub const HANDLE_MAX_LEN: usize = 30;

fn is_handle_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

/// Filter raw keystrokes into handle form
///
/// Uppercase ASCII is lowered, every other character outside
/// `[a-z0-9_]` is dropped, and the result is cut at the maximum length.
pub fn filter_handle_input(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| is_handle_char(*c))
        .take(HANDLE_MAX_LEN)
        .collect()
}

/// True when `handle` only uses handle characters (length not checked)
pub fn has_only_handle_chars(handle: &str) -> bool {
    !handle.is_empty() && handle.chars().all(is_handle_char)
}

/// Validate a handle before submission
pub fn validate_handle(handle: &str) -> Result<()> {
    if !has_only_handle_chars(handle) {
        return Err(Error::InvalidHandle(handle.to_string()));
    }

    let len = handle.chars().count();
    if !(HANDLE_MIN_LEN..=HANDLE_MAX_LEN).contains(&len) {
        return Err(Error::InvalidInput(format!(
            "Handles must be between {} and {} characters",
            HANDLE_MIN_LEN, HANDLE_MAX_LEN
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_lowercases_and_drops_invalid_chars() {
        assert_eq!(filter_handle_input("Daft Punk!"), "daftpunk");
        assert_eq!(filter_handle_input("rave_2023"), "rave_2023");
        assert_eq!(filter_handle_input("émile-x"), "milex");
    }

    #[test]
    fn test_filter_caps_length() {
        let long = "a".repeat(50);
        assert_eq!(filter_handle_input(&long).len(), HANDLE_MAX_LEN);
    }

    #[test]
    fn test_filtered_input_always_has_valid_chars() {
        for raw in ["ABC", "a b c", "@@@x", "x.y.z", "ÅÄÖ__1"] {
            let filtered = filter_handle_input(raw);
            assert!(filtered.is_empty() || has_only_handle_chars(&filtered), "{raw}");
        }
    }

    #[test]
    fn test_validate_rejects_out_of_set_chars() {
        for bad in ["Daft", "daft punk", "daft-punk", "daft.punk", "dåft"] {
            assert!(matches!(validate_handle(bad), Err(Error::InvalidHandle(_))), "{bad}");
        }
    }

    #[test]
    fn test_validate_length_bounds() {
        assert!(validate_handle("ab").is_err());
        assert!(validate_handle("abc").is_ok());
        assert!(validate_handle(&"a".repeat(HANDLE_MAX_LEN)).is_ok());
        assert!(validate_handle(&"a".repeat(HANDLE_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_empty_is_invalid() {
        assert!(matches!(validate_handle(""), Err(Error::InvalidHandle(_))));
    }
}
