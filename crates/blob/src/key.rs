//! Blob key validation.
//!
//! Keys are caller-chosen, but they double as file names inside backup
//! archives (`images/<category>/<key>.<ext>`), so anything that could not
//! round-trip as a single path segment is rejected up front.

use crate::error::{ErrorKind, Result};

/// Suffix reserved for staged uploads.
pub const STAGING_SUFFIX: &str = "-temp";

/// Validates a blob key.
///
/// # Examples
///
/// ```
/// use hearth_blob::validate_key;
/// assert!(validate_key("user-avatar").is_ok());
/// assert!(validate_key("chat-42-1700000000.png").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("..").is_err());
/// assert!(validate_key("a/b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<&str> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.trim() != key
        || key.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if invalid {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Whether the key belongs to a staged upload.
#[inline]
#[must_use]
pub fn is_staging_key(key: &str) -> bool {
    key.ends_with(STAGING_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user-avatar")]
    #[case("sticker-0b6f")]
    #[case("chat.image.png")]
    #[case("with space")]
    fn test_valid_keys(#[case] key: &str) {
        assert_eq!(validate_key(key).unwrap(), key);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a\\b")]
    #[case(" padded")]
    #[case("tab\tkey")]
    #[case("\0")]
    fn test_invalid_keys(#[case] key: &str) {
        let err = validate_key(key).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[test]
    fn test_staging_marker() {
        assert!(is_staging_key("5b1c-temp"));
        assert!(!is_staging_key("temp-5b1c"));
    }
}
