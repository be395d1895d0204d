use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for route authorization.
///
/// Roles are opaque, case-sensitive strings (`ADMIN`, `USER`). Some upstream
/// identity stores hand out `ROLE_`-prefixed authority names; [`Role::new`]
/// strips every leading `ROLE_` so both spellings compare equal and a
/// normalized role is unchanged by another pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("ADMIN"));
    pub const USER: Role = Role(Cow::Borrowed("USER"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        let stripped = name.trim_start_matches("ROLE_");
        if stripped.len() == name.len() {
            Self(name)
        } else {
            Self(Cow::Owned(stripped.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_prefix_is_normalized() {
        assert_eq!(Role::new("ROLE_ADMIN"), Role::ADMIN);
        assert_eq!(Role::new("USER"), Role::USER);
        assert_ne!(Role::new("admin"), Role::ADMIN);
    }

    #[test]
    fn normalization_is_idempotent() {
        let role = Role::new("ROLE_ROLE_AUDITOR");
        assert_eq!(role.as_str(), "AUDITOR");
        assert_eq!(Role::new(role.as_str().to_string()), role);

        let back: Role = serde_json::from_str(&serde_json::to_string(&role).unwrap()).unwrap();
        assert_eq!(back, role);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Role::ADMIN).unwrap();
        assert_eq!(json, "\"ADMIN\"");
        let back: Role = serde_json::from_str("\"ROLE_USER\"").unwrap();
        assert_eq!(back, Role::USER);
    }
}
