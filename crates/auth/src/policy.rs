use serde::Serialize;
use thiserror::Error;

use trustgate_core::{ConfigError, GateConfig, RoutePattern};

use crate::{Identity, Role};

/// What a route requires of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// No identity needed; the gate does not even look at the token.
    Public,
    /// Any valid identity.
    Authenticated,
    /// A valid identity holding this role.
    Role(Role),
}

/// A single entry of the route authorization table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub pattern: RoutePattern,
    pub access: RouteAccess,
}

impl AccessRule {
    pub fn new(pattern: &str, access: RouteAccess) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            access,
        })
    }

    pub fn public(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(pattern, RouteAccess::Public)
    }

    pub fn authenticated(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(pattern, RouteAccess::Authenticated)
    }

    pub fn role(pattern: &str, role: Role) -> Result<Self, ConfigError> {
        Self::new(pattern, RouteAccess::Role(role))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// No identity, or the presented token was not valid.
    #[error("authentication required")]
    Unauthenticated,

    /// Valid identity without the role the route requires.
    #[error("missing required role '{required}'")]
    InsufficientRole { required: Role },

    /// Valid identity on a route no rule covers.
    #[error("no access rule covers this route")]
    NoMatchingRule,
}

impl DenialReason {
    pub fn kind(&self) -> DenialKind {
        match self {
            DenialReason::Unauthenticated => DenialKind::Unauthenticated,
            DenialReason::InsufficientRole { .. } => DenialKind::InsufficientRole,
            DenialReason::NoMatchingRule => DenialKind::NoMatchingRule,
        }
    }

    /// Whether the caller should be told to authenticate (401) rather than
    /// being refused outright (403).
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, DenialReason::Unauthenticated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Unauthenticated,
    InsufficientRole,
    NoMatchingRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Prefix,
}

/// Route → required access table.
///
/// Resolution order:
/// 1. exact-path rules
/// 2. the longest matching `/**` prefix rule
/// 3. default deny
///
/// Built once at startup; read-only afterwards, so it can be shared across
/// requests without locking.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicyEngine {
    exact: Vec<AccessRule>,
    /// Sorted by descending specificity.
    prefix: Vec<AccessRule>,
}

impl AccessPolicyEngine {
    pub fn new(rules: impl IntoIterator<Item = AccessRule>) -> Self {
        let (exact, mut prefix): (Vec<_>, Vec<_>) =
            rules.into_iter().partition(|r| r.pattern.is_exact());
        // Stable sort: among equally specific prefixes the first declared wins.
        prefix.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));
        Self { exact, prefix }
    }

    /// The standard table: configured public routes, the admin subtree
    /// restricted to [`Role::ADMIN`], and every other `/api` route open to
    /// any authenticated caller.
    pub fn standard(config: &GateConfig) -> Result<Self, ConfigError> {
        let mut rules: Vec<AccessRule> = config
            .public_routes
            .iter()
            .cloned()
            .map(|pattern| AccessRule {
                pattern,
                access: RouteAccess::Public,
            })
            .collect();

        let admin_base = config.admin_prefix.trim_end_matches('/');
        rules.push(AccessRule::role(&format!("{admin_base}/**"), Role::ADMIN)?);
        rules.push(AccessRule::authenticated("/api/**")?);

        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> impl Iterator<Item = &AccessRule> {
        self.exact.iter().chain(self.prefix.iter())
    }

    pub fn resolve(&self, route: &str) -> Option<(&AccessRule, MatchKind)> {
        if let Some(rule) = self.exact.iter().find(|r| r.pattern.matches(route)) {
            return Some((rule, MatchKind::Exact));
        }
        self.prefix
            .iter()
            .find(|r| r.pattern.matches(route))
            .map(|rule| (rule, MatchKind::Prefix))
    }

    pub fn is_public(&self, route: &str) -> bool {
        matches!(self.resolve(route), Some((rule, _)) if rule.access == RouteAccess::Public)
    }

    /// Decide whether `identity` may call `route`.
    ///
    /// - No IO
    /// - No panics
    pub fn authorize(&self, route: &str, identity: Option<&Identity>) -> Decision {
        let Some((rule, _)) = self.resolve(route) else {
            return match identity {
                None => Decision::Deny(DenialReason::Unauthenticated),
                Some(_) => Decision::Deny(DenialReason::NoMatchingRule),
            };
        };

        match (&rule.access, identity) {
            (RouteAccess::Public, _) => Decision::Allow,
            (_, None) => Decision::Deny(DenialReason::Unauthenticated),
            (RouteAccess::Authenticated, Some(_)) => Decision::Allow,
            (RouteAccess::Role(required), Some(identity)) => {
                if identity.has_role(required) {
                    Decision::Allow
                } else {
                    Decision::Deny(DenialReason::InsufficientRole {
                        required: required.clone(),
                    })
                }
            }
        }
    }

    /// Explain why `authorize` would allow or deny this call.
    pub fn explain(&self, route: &str, identity: Option<&Identity>) -> AccessExplanation {
        let resolved = self.resolve(route);
        let decision = self.authorize(route, identity);

        let required = match resolved.map(|(rule, _)| &rule.access) {
            Some(RouteAccess::Public) => "public".to_string(),
            Some(RouteAccess::Authenticated) => "authenticated".to_string(),
            Some(RouteAccess::Role(role)) => format!("role:{role}"),
            None => "none (default deny)".to_string(),
        };

        let reason = match (&decision, resolved) {
            (Decision::Allow, Some((rule, _))) => match &rule.access {
                RouteAccess::Public => format!("Route matches public rule '{}'", rule.pattern),
                RouteAccess::Authenticated => {
                    format!("Caller is authenticated and rule '{}' requires nothing more", rule.pattern)
                }
                RouteAccess::Role(role) => {
                    format!("Caller holds role '{role}' required by rule '{}'", rule.pattern)
                }
            },
            (Decision::Allow, None) => "Allowed".to_string(),
            (Decision::Deny(reason), _) => reason.to_string(),
        };

        AccessExplanation {
            route: route.to_string(),
            matched_rule: resolved.map(|(rule, _)| rule.pattern.to_string()),
            match_kind: resolved.map(|(_, kind)| kind),
            required,
            granted: decision.is_allowed(),
            reason,
            denial: match &decision {
                Decision::Deny(reason) => Some(reason.kind()),
                Decision::Allow => None,
            },
            caller: identity.map(|i| i.username().to_string()),
            caller_roles: identity.map(Identity::role_names).unwrap_or_default(),
        }
    }
}

/// Detailed, serialisable account of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub route: String,
    pub matched_rule: Option<String>,
    pub match_kind: Option<MatchKind>,
    pub required: String,
    pub granted: bool,
    pub reason: String,
    pub denial: Option<DenialKind>,
    pub caller: Option<String>,
    pub caller_roles: Vec<String>,
}
