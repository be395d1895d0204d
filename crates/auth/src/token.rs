//! Signed bearer tokens (compact HS256 JWTs).
//!
//! Tokens are stateless: validating one is a pure function of the token, the
//! current time and the process-wide secret. The signature is checked before
//! any part of the token is parsed, so a modified token is reported as
//! [`TokenError::SignatureInvalid`] rather than as a parse failure.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use trustgate_core::{ConfigError, GateConfig};

use crate::{Identity, TokenClaims, validate_claims};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Claim timestamps are whole seconds; shorter lifetimes are raised to this.
const MIN_TTL_SECS: i64 = 1;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    #[error("token could not be encoded")]
    Encoding,
}

impl TokenError {
    /// Stable code used in audit records and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Malformed => "token_malformed",
            TokenError::SignatureInvalid => "token_signature_invalid",
            TokenError::Expired => "token_expired",
            TokenError::Encoding => "token_encoding_failed",
        }
    }
}

/// An issued bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Token(..)")
    }
}

/// Request-boundary view of token validation.
///
/// The gate only needs this half of [`TokenService`].
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Issues, validates and refreshes bearer tokens.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: impl AsRef<[u8]>, default_ttl: Duration) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if default_ttl <= Duration::zero() {
            return Err(ConfigError::invalid("token_ttl_secs", "must be greater than zero"));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| ConfigError::invalid("jwt_secret", "not usable as an HMAC key"))?;
        Ok(Self { mac, default_ttl })
    }

    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let ttl_secs = i64::try_from(config.token_ttl_secs)
            .map_err(|_| ConfigError::invalid("token_ttl_secs", "out of range"))?;
        Self::new(config.jwt_secret.as_bytes(), Duration::seconds(ttl_secs))
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for `identity`, valid from `now` for at least `ttl`
    /// (and never less than one second).
    pub fn issue(
        &self,
        identity: &Identity,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Token, TokenError> {
        let ttl = ttl.max(Duration::seconds(MIN_TTL_SECS));
        let claims = TokenClaims::for_identity(identity, now, ttl);
        self.sign(&claims)
    }

    /// Issue a token with the configured lifetime.
    pub fn issue_default(&self, identity: &Identity, now: DateTime<Utc>) -> Result<Token, TokenError> {
        self.issue(identity, self.default_ttl, now)
    }

    /// Verify `token` and return the identity it carries.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        let claims = self.verify(token)?;
        validate_claims(&claims, now)?;
        Ok(claims.into_identity())
    }

    /// Re-issue a still-valid token with a fresh lifetime.
    ///
    /// No grace window: an expired or tampered token fails exactly as
    /// [`TokenService::validate`] would. The superseded token is not revoked.
    pub fn refresh(&self, token: &str, now: DateTime<Utc>) -> Result<Token, TokenError> {
        let identity = self.validate(token, now)?;
        self.issue_default(&identity, now)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<Token, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = serde_json::to_vec(&header).map_err(|_| TokenError::Encoding)?;
        let payload = serde_json::to_vec(claims).map_err(|_| TokenError::Encoding)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(signing_input.as_bytes()));
        Ok(Token(format!("{signing_input}.{signature}")))
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let token = token.trim();
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::SignatureInvalid)?;
        let signing_input_len = header.len() + 1 + payload.len();
        let expected = self.mac(&token.as_bytes()[..signing_input_len]);
        if provided.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
            return Err(TokenError::SignatureInvalid);
        }

        let header: Header = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }
        decode_segment(payload)
    }

    fn mac(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

impl TokenValidator for TokenService {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, TokenError> {
        TokenService::validate(self, token, now)
    }
}

// The key must never reach logs.
impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("key", &"<redacted>")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::Role;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn service() -> TokenService {
        TokenService::new("unit-test-secret", Duration::hours(1)).unwrap()
    }

    fn alice() -> Identity {
        Identity::new("alice", [Role::USER])
    }

    fn tamper(token: &str, index: usize) -> String {
        let mut bytes = token.as_bytes().to_vec();
        bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn rejects_empty_secret() {
        assert_eq!(
            TokenService::new("", Duration::hours(1)).unwrap_err(),
            ConfigError::EmptySecret
        );
    }

    #[test]
    fn issued_token_round_trips() {
        let svc = service();
        let token = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        assert_eq!(svc.validate(token.as_str(), at(1_030)), Ok(alice()));
    }

    #[test]
    fn token_expires_after_ttl() {
        let svc = service();
        let token = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        assert_eq!(svc.validate(token.as_str(), at(1_061)), Err(TokenError::Expired));
    }

    #[test]
    fn shared_mac_does_not_carry_state_between_tokens() {
        let svc = service();
        let first = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        let bob = svc
            .issue(&Identity::new("bob", [Role::ADMIN]), Duration::seconds(60), at(1_000))
            .unwrap();
        let again = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        assert_eq!(first, again);
        assert_ne!(first, bob);
        let validated = svc.validate(bob.as_str(), at(1_001)).unwrap();
        assert_eq!(validated.username(), "bob");
    }

    #[test]
    fn fractional_issue_time_keeps_full_lifetime() {
        let svc = service();
        let issued = at(1_000) + Duration::milliseconds(900);
        let token = svc.issue(&alice(), Duration::seconds(1), issued).unwrap();
        assert_eq!(
            svc.validate(token.as_str(), at(1_001) + Duration::milliseconds(400)),
            Ok(alice())
        );
    }

    #[test]
    fn sub_second_ttl_is_raised_to_one_second() {
        let svc = service();
        let issued = at(1_000) + Duration::milliseconds(200);
        let token = svc.issue(&alice(), Duration::milliseconds(500), issued).unwrap();
        assert_eq!(
            svc.validate(token.as_str(), issued + Duration::milliseconds(100)),
            Ok(alice())
        );
        assert_eq!(
            svc.validate(token.as_str(), issued + Duration::milliseconds(900)),
            Ok(alice())
        );
        assert_eq!(svc.validate(token.as_str(), at(1_003)), Err(TokenError::Expired));
    }

    #[test]
    fn prefixed_roles_survive_the_round_trip() {
        let svc = service();
        let id = Identity::new("alice", [Role::new("ROLE_ROLE_AUDITOR"), Role::new("ROLE_USER")]);
        let token = svc.issue(&id, Duration::seconds(60), at(1_000)).unwrap();
        assert_eq!(svc.validate(token.as_str(), at(1_010)), Ok(id));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = TokenService::new("another-secret", Duration::hours(1)).unwrap();
        let token = other.issue_default(&alice(), at(1_000)).unwrap();
        assert_eq!(
            service().validate(token.as_str(), at(1_000)),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn structural_garbage_is_malformed() {
        let svc = service();
        for raw in ["", "abc", "a.b", "a..c", "a.b.c.d", ".."] {
            assert_eq!(svc.validate(raw, at(0)), Err(TokenError::Malformed), "input: {raw:?}");
        }
    }

    #[test]
    fn foreign_algorithm_is_malformed_even_when_signed() {
        let svc = service();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = TokenClaims::for_identity(&alice(), at(0), Duration::seconds(60));
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let input = format!("{header}.{payload}");
        let sig = URL_SAFE_NO_PAD.encode(svc.mac(input.as_bytes()));
        assert_eq!(svc.validate(&format!("{input}.{sig}"), at(1)), Err(TokenError::Malformed));
    }

    #[test]
    fn refresh_issues_fresh_window_for_same_identity() {
        let svc = service();
        let original = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        let refreshed = svc.refresh(original.as_str(), at(1_050)).unwrap();

        // Still valid long after the original would have expired.
        assert_eq!(svc.validate(refreshed.as_str(), at(1_050 + 3_599)), Ok(alice()));
        // The superseded token is not revoked.
        assert_eq!(svc.validate(original.as_str(), at(1_055)), Ok(alice()));
    }

    #[test]
    fn refresh_has_no_grace_window() {
        let svc = service();
        let token = svc.issue(&alice(), Duration::seconds(60), at(1_000)).unwrap();
        assert_eq!(svc.refresh(token.as_str(), at(1_061)), Err(TokenError::Expired));
    }

    #[test]
    fn debug_output_hides_key_and_token() {
        let svc = service();
        let token = svc.issue_default(&alice(), at(0)).unwrap();
        assert!(!format!("{svc:?}").contains("unit-test-secret"));
        assert_eq!(format!("{token:?}"), "Token(..)");
    }

    fn identity_strategy() -> impl Strategy<Value = Identity> {
        (
            "[a-z][a-z0-9_.]{0,15}",
            prop::collection::btree_set(prop::sample::select(vec![
                "ADMIN",
                "USER",
                "AUDITOR",
                "OPERATOR",
                "ROLE_AUDITOR",
                "ROLE_ROLE_OPERATOR",
            ]), 0..4),
        )
            .prop_map(|(name, roles)| Identity::new(name, roles.into_iter().map(Role::new)))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a token validates to its identity strictly inside its
        /// lifetime and is expired once the lifetime has elapsed.
        #[test]
        fn validate_inverts_issue_within_ttl(
            identity in identity_strategy(),
            issued_ms in 0i64..4_000_000_000_000,
            ttl_ms in 1_000i64..1_000_000_000,
            offset_ms in 0i64..1_000_000_000,
        ) {
            let svc = service();
            let issued = at(0) + Duration::milliseconds(issued_ms);
            let token = svc.issue(&identity, Duration::milliseconds(ttl_ms), issued).unwrap();
            let now = issued + Duration::milliseconds(offset_ms);
            if offset_ms < ttl_ms {
                prop_assert_eq!(svc.validate(token.as_str(), now), Ok(identity));
            } else if offset_ms > ttl_ms + 1_000 {
                // Expiry rounds up to a whole second.
                prop_assert_eq!(svc.validate(token.as_str(), now), Err(TokenError::Expired));
            }
        }

        /// Property: changing any non-separator byte is caught by the
        /// signature check.
        #[test]
        fn tampering_any_byte_invalidates_signature(
            identity in identity_strategy(),
            index in any::<prop::sample::Index>(),
        ) {
            let svc = service();
            let token = svc.issue(&identity, Duration::seconds(600), at(1_000)).unwrap().into_string();
            let i = index.index(token.len());
            prop_assume!(token.as_bytes()[i] != b'.');
            let tampered = tamper(&token, i);
            prop_assert_eq!(svc.validate(&tampered, at(1_001)), Err(TokenError::SignatureInvalid));
        }

        /// Property: refresh fails with exactly the error validate reports.
        #[test]
        fn refresh_fails_like_validate(
            identity in identity_strategy(),
            index in any::<prop::sample::Index>(),
            late in any::<bool>(),
        ) {
            let svc = service();
            let token = svc.issue(&identity, Duration::seconds(60), at(1_000)).unwrap().into_string();
            let candidate = if late { token } else {
                let i = index.index(token.len());
                prop_assume!(token.as_bytes()[i] != b'.');
                tamper(&token, i)
            };
            let now = if late { at(2_000) } else { at(1_001) };
            let expected = svc.validate(&candidate, now).unwrap_err();
            prop_assert_eq!(svc.refresh(&candidate, now).unwrap_err(), expected);
        }
    }
}
