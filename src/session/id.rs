//! Session identifier type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionStoreError;

/// Identifier of a logical session, used verbatim as the store key.
///
/// Ids are minted by the caller (typically from a cookie or URL segment);
/// the only requirement here is that they are non-empty and free of
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a session id.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() || id.trim() != id {
            return Err(SessionStoreError::InvalidSessionId(id));
        }
        Ok(Self(id))
    }

    /// The id as a store key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = SessionStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionStoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionStoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_valid() {
        let id: SessionId = "abc123".parse().unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(id.to_string(), "abc123");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<SessionId>().is_err());
        assert!(" s1".parse::<SessionId>().is_err());
        assert!("s1\n".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = SessionId::new("s1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");

        let back: SessionId = serde_json::from_str("\"s1\"").unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<SessionId>("\"\"").is_err());
    }

    #[test]
    fn test_hash_eq() {
        let id1 = SessionId::new("a").unwrap();
        let id2 = SessionId::new("a").unwrap();
        let id3 = SessionId::new("b").unwrap();

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);

        let mut set = HashSet::new();
        set.insert(id1);
        assert!(set.contains(&id2));
        assert!(!set.contains(&id3));
    }
}
