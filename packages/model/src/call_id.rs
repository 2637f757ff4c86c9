//! Call identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier attached to a single execution call.
///
/// The privileged side echoes the id of the request it answers, which lets
/// the initiating side recognise responses that belong to an earlier call
/// that already timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Create a new random CallId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a CallId from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_display() {
        let id = CallId::new();
        assert_eq!(format!("{}", id).len(), 36);
    }

    #[test]
    fn call_ids_are_unique() {
        assert_ne!(CallId::default(), CallId::default());
    }

    #[test]
    fn call_id_serializes_as_plain_string() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&CallId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }
}
