//! Authenticated user identity.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::error::ChatError;

/// Opaque authenticated user handle.
///
/// Owned by the authentication collaborator; the session store never
/// mutates it. Construction trims surrounding whitespace and rejects empty
/// handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a validated user handle.
    pub fn new(handle: impl Into<String>) -> Result<Self, ChatError> {
        let handle = handle.into().trim().to_string();
        if handle.is_empty() {
            return Err(ChatError::Validation(
                "identity cannot be empty".to_string(),
            ));
        }
        Ok(Self(handle))
    }

    /// The underlying handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_trims_whitespace() {
        let id = Identity::new("  alice  ").unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert!(Identity::new("").is_err());
        assert!(Identity::new("   ").is_err());
    }

    #[test]
    fn test_identity_serde_transparent() {
        let id = Identity::new("bob").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bob\"");
        let parsed: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
