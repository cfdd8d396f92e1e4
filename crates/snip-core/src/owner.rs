use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque identity of the caller that owns a record.
///
/// The value is produced by an external identity mechanism and is only used
/// to scope listing and deletion. The only requirement is that it is not blank.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Returns [`CoreError::Unauthorized`] for a blank identity.
    pub fn new(owner: impl Into<String>) -> Result<Self, CoreError> {
        let owner = owner.into();
        if owner.trim().is_empty() {
            return Err(CoreError::Unauthorized);
        }
        Ok(Self(owner))
    }

    /// Used when reading owners back from durable storage.
    pub fn new_unchecked(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_owner_is_unauthorized() {
        assert_eq!(OwnerId::new(""), Err(CoreError::Unauthorized));
        assert_eq!(OwnerId::new("   "), Err(CoreError::Unauthorized));
    }

    #[test]
    fn owner_is_opaque() {
        let owner = OwnerId::new("3f2a-anon.user").unwrap();
        assert_eq!(owner.as_str(), "3f2a-anon.user");
    }
}
