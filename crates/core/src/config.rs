//! Process-wide gate configuration.
//!
//! Loaded once at startup and never mutated afterwards. Defaults mirror the
//! routes of the deployed document-processing service.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult, RoutePattern};

/// Insecure fallback secret for local development only.
pub const DEV_SECRET: &str = "dev-secret";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// HMAC signing secret for bearer tokens.
    pub jwt_secret: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Requests at or above this duration are reported as slow.
    pub slow_request_ms: u64,

    /// Requests at or above this duration are reported as very slow.
    pub very_slow_request_ms: u64,

    /// Routes that bypass token validation (still audited).
    pub public_routes: Vec<RoutePattern>,

    /// Routes that skip the pipeline entirely: no context, no audit.
    pub excluded_routes: Vec<RoutePattern>,

    /// Prefix of administrative routes.
    pub admin_prefix: String,

    /// Routes whose outcome is reported as an authentication event.
    pub auth_routes: Vec<RoutePattern>,

    /// Upper bound on handler execution; `None` disables the timeout.
    pub handler_timeout_ms: Option<u64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 24 * 60 * 60,
            slow_request_ms: 2_000,
            very_slow_request_ms: 5_000,
            public_routes: patterns(&[
                "/api/auth/**",
                "/login",
                "/logout",
                "/error",
                "/health",
                "/ping",
                "/actuator/health",
                "/favicon.ico",
                "/static/**",
                "/css/**",
                "/js/**",
                "/images/**",
                "/webjars/**",
            ]),
            excluded_routes: patterns(&[
                "/health",
                "/ping",
                "/actuator/health",
                "/favicon.ico",
                "/static/**",
                "/css/**",
                "/js/**",
                "/images/**",
                "/webjars/**",
            ]),
            admin_prefix: "/api/admin/".to_string(),
            auth_routes: patterns(&["/api/auth/**", "/login", "/logout"]),
            handler_timeout_ms: Some(30_000),
        }
    }
}

impl GateConfig {
    /// Defaults with the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Self::default()
        }
    }

    /// Check cross-field constraints. Called once before the config is shared.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::invalid("token_ttl_secs", "must be greater than zero"));
        }
        if self.slow_request_ms == 0 {
            return Err(ConfigError::invalid("slow_request_ms", "must be greater than zero"));
        }
        if self.very_slow_request_ms <= self.slow_request_ms {
            return Err(ConfigError::invalid(
                "very_slow_request_ms",
                format!(
                    "must exceed slow_request_ms ({} <= {})",
                    self.very_slow_request_ms, self.slow_request_ms
                ),
            ));
        }
        if !self.admin_prefix.starts_with('/') {
            return Err(ConfigError::invalid("admin_prefix", "must start with '/'"));
        }
        if self.handler_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("handler_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn is_excluded(&self, route: &str) -> bool {
        self.excluded_routes.iter().any(|p| p.matches(route))
    }

    pub fn is_auth_route(&self, route: &str) -> bool {
        self.auth_routes.iter().any(|p| p.matches(route))
    }

    pub fn is_admin_route(&self, route: &str) -> bool {
        route.starts_with(&self.admin_prefix)
    }
}

// The secret must never reach logs.
impl core::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GateConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("slow_request_ms", &self.slow_request_ms)
            .field("very_slow_request_ms", &self.very_slow_request_ms)
            .field("public_routes", &self.public_routes)
            .field("excluded_routes", &self.excluded_routes)
            .field("admin_prefix", &self.admin_prefix)
            .field("auth_routes", &self.auth_routes)
            .field("handler_timeout_ms", &self.handler_timeout_ms)
            .finish()
    }
}

fn patterns(raw: &[&str]) -> Vec<RoutePattern> {
    raw.iter()
        .filter_map(|p| RoutePattern::parse(p).ok())
        .collect()
}
