//! Bucket key validation and handling.

use std::fmt;

use crate::error::{BucketeerError, Result};

/// The identity of a quota holder, e.g. an API key.
///
/// The key is used verbatim as the store's row identifier. It is never
/// hashed down to a number, so two distinct keys can never share a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Validate and wrap a raw key.
    ///
    /// Empty keys are rejected, as are keys with NUL bytes since a text
    /// column cannot hold them.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(BucketeerError::InvalidKey("key must not be empty".to_string()));
        }
        if raw.contains('\0') {
            return Err(BucketeerError::InvalidKey(
                "key must not contain NUL bytes".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// The key exactly as the caller supplied it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BucketKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for BucketKey {
    type Error = BucketeerError;

    fn try_from(raw: &str) -> Result<Self> {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_kept_verbatim() {
        let key = BucketKey::new("  Api-Key/42 ").unwrap();
        assert_eq!(key.as_str(), "  Api-Key/42 ");
        assert_eq!(key.to_string(), "  Api-Key/42 ");
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = BucketKey::new("").unwrap_err();
        assert!(matches!(err, BucketeerError::InvalidKey(_)));
    }

    #[test]
    fn test_nul_key_rejected() {
        let err = BucketKey::try_from("abc\0def").unwrap_err();
        assert!(matches!(err, BucketeerError::InvalidKey(_)));
    }

    #[test]
    fn test_hash_colliding_strings_stay_distinct() {
        // "Aa" and "BB" share a 32-bit string hash code in some runtimes.
        let a = BucketKey::new("Aa").unwrap();
        let b = BucketKey::new("BB").unwrap();
        assert_ne!(a, b);
    }
}
