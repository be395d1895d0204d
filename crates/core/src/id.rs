//! Request identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation identifier of a single request: `REQ-` followed by 8 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub const PREFIX: &'static str = "REQ-";

    /// Generate a fresh identifier from a random (v4) UUID.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, &simple[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` has the `REQ-xxxxxxxx` shape.
    pub fn is_well_formed(s: &str) -> bool {
        match s.strip_prefix(Self::PREFIX) {
            Some(hex) => hex.len() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let id = RequestId::generate();
        assert!(RequestId::is_well_formed(id.as_str()), "bad id: {id}");
        assert_eq!(id.as_str().len(), 12);
    }

    #[test]
    fn generated_ids_differ() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!RequestId::is_well_formed("REQ-123"));
        assert!(!RequestId::is_well_formed("REQ-zzzzzzzz"));
        assert!(!RequestId::is_well_formed("ID-12345678"));
    }
}
