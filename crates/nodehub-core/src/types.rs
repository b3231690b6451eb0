/*!
 * Core data types for NodeHub.
 *
 * This module defines the identifier type shared by the hub session,
 * registry, and connection manager.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for NodeHub resources.
///
/// Device identifiers are stable hardware addresses supplied by the
/// transport (for example `DC:A6:32:A3:F2:15`); session identifiers are
/// generated randomly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self::from_string(uuid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = Id::new();
        assert!(!id.as_str().is_empty());

        let id = Id::from_string("DC:A6:32:A3:F2:15");
        assert_eq!(id.as_str(), "DC:A6:32:A3:F2:15");

        let id: Id = "E1:B4:27:C5:D8:91".into();
        assert_eq!(id.as_str(), "E1:B4:27:C5:D8:91");

        let id: Id = String::from("string-id").into();
        assert_eq!(id.as_str(), "string-id");
    }

    #[test]
    fn test_id_display() {
        let id = Id::from_string("test-id");
        assert_eq!(format!("{}", id), "test-id");
    }

    #[test]
    fn test_random_ids_are_unique() {
        let a = Id::new();
        let b = Id::new();
        assert_ne!(a, b);
    }
}
