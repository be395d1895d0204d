use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Identity, Role, TokenError};

/// Claims carried inside a bearer token.
///
/// Field names follow the registered JWT claim names so that tokens can be
/// inspected with standard tooling. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username).
    pub sub: String,

    /// Roles granted to the subject.
    pub roles: Vec<Role>,

    /// Issued-at.
    pub iat: i64,

    /// Expiration.
    pub exp: i64,
}

impl TokenClaims {
    /// Claims valid from `issued_at` for at least `ttl`.
    ///
    /// Claim timestamps are whole seconds: `iat` rounds down and `exp` rounds
    /// up, so the encoded window always covers the requested one.
    pub fn for_identity(identity: &Identity, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let partial = i64::from(expires_at.timestamp_subsec_nanos() > 0);
        Self {
            sub: identity.username().to_string(),
            roles: identity.roles().iter().cloned().collect(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp().saturating_add(partial),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn into_identity(self) -> Identity {
        Identity::new(self.sub, self.roles)
    }
}

/// Deterministically validate token claims against `now`.
///
/// Note: this validates the *claims* only. The signature has already been
/// checked by the time this runs.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.sub.is_empty() || claims.exp < claims.iat {
        return Err(TokenError::Malformed);
    }
    let expires_at = claims.expires_at().ok_or(TokenError::Malformed)?;
    if now > expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}
