//! Route patterns shared by the access policy and the gate's exclusion list.
//!
//! Two shapes are supported:
//! - exact paths (`/health`)
//! - subtree patterns ending in `/**` (`/api/admin/**`), which match the base
//!   path itself and anything below it.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoutePattern {
    Exact(String),
    /// Base path without the trailing `/**`. Empty for the catch-all `/**`.
    Prefix(String),
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if !raw.starts_with('/') {
            return Err(ConfigError::InvalidPattern(raw.to_string()));
        }

        if let Some(base) = raw.strip_suffix("/**") {
            if base.contains('*') {
                return Err(ConfigError::InvalidPattern(raw.to_string()));
            }
            return Ok(Self::Prefix(base.to_string()));
        }

        if raw.contains('*') {
            return Err(ConfigError::InvalidPattern(raw.to_string()));
        }
        Ok(Self::Exact(raw.to_string()))
    }

    pub fn matches(&self, route: &str) -> bool {
        match self {
            Self::Exact(path) => route == path,
            Self::Prefix(base) => {
                route == base
                    || route
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Length of the literal part; longer means more specific.
    pub fn specificity(&self) -> usize {
        match self {
            Self::Exact(path) | Self::Prefix(path) => path.len(),
        }
    }
}

impl core::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exact(path) => f.write_str(path),
            Self::Prefix(base) => write!(f, "{base}/**"),
        }
    }
}

impl FromStr for RoutePattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoutePattern {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoutePattern> for String {
    fn from(value: RoutePattern) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern_matches_only_itself() {
        let p = RoutePattern::parse("/health").unwrap();
        assert!(p.matches("/health"));
        assert!(!p.matches("/health/live"));
        assert!(!p.matches("/healthz"));
    }

    #[test]
    fn prefix_pattern_matches_base_and_subtree() {
        let p = RoutePattern::parse("/api/admin/**").unwrap();
        assert!(p.matches("/api/admin"));
        assert!(p.matches("/api/admin/users"));
        assert!(p.matches("/api/admin/users/42"));
        assert!(!p.matches("/api/administrator"));
        assert!(!p.matches("/api"));
    }

    #[test]
    fn catch_all_matches_everything() {
        let p = RoutePattern::parse("/**").unwrap();
        assert!(p.matches("/"));
        assert!(p.matches("/anything/at/all"));
        assert_eq!(p.specificity(), 0);
    }

    #[test]
    fn rejects_relative_and_inner_wildcards() {
        assert!(RoutePattern::parse("api/**").is_err());
        assert!(RoutePattern::parse("/api/*/users").is_err());
        assert!(RoutePattern::parse("/api/**/users/**").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for raw in ["/login", "/static/**", "/**"] {
            let p = RoutePattern::parse(raw).unwrap();
            assert_eq!(p.to_string(), raw);
        }
    }
}
