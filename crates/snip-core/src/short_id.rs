use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A validated short identifier for a stored URL.
///
/// Short ids must be 3-32 characters long and contain only the URL-safe
/// alphabet: alphanumerics, hyphens and underscores.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortId(String);

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 32;

impl ShortId {
    /// Creates a new `ShortId` after validating the input.
    ///
    /// Valid ids are 3-32 characters and contain only `[a-zA-Z0-9_-]`.
    pub fn new(id: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Creates a `ShortId` without validation.
    ///
    /// Use this only for ids produced by trusted internal sources
    /// (e.g. generators, or rows read back from a backend).
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the full short URL under the given base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> std::result::Result<(), CoreError> {
        if id.len() < MIN_LENGTH || id.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortId(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                id.len()
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortId(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                id
            )));
        }

        Ok(())
    }
}

impl Display for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(ShortId::new("abc").is_ok());
        assert!(ShortId::new("Abc-123_xyz").is_ok());
        assert!(ShortId::new("a".repeat(32)).is_ok());
    }

    #[test]
    fn too_short() {
        assert!(ShortId::new("ab").is_err());
        assert!(ShortId::new("").is_err());
    }

    #[test]
    fn too_long() {
        assert!(ShortId::new("a".repeat(33)).is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(ShortId::new("abc def").is_err());
        assert!(ShortId::new("abc/def").is_err());
        assert!(ShortId::new("abc=").is_err());
    }

    #[test]
    fn to_url_trims_trailing_slash() {
        let id = ShortId::new("abc123").unwrap();
        assert_eq!(id.to_url("http://localhost:8080"), "http://localhost:8080/abc123");
        assert_eq!(id.to_url("http://localhost:8080/"), "http://localhost:8080/abc123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ShortId::new("abc123").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }
}
