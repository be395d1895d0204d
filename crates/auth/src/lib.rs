//! `trustgate-auth`: token issuance/validation and route authorization.
//!
//! This crate is intentionally decoupled from HTTP: it deals in route strings,
//! identities and decisions. The request boundary lives in `trustgate-api`.

pub mod claims;
pub mod credentials;
pub mod identity;
pub mod policy;
pub mod roles;
pub mod token;

pub use claims::{TokenClaims, validate_claims};
pub use credentials::{
    AuthenticatedUser, Authenticator, CredentialVerifier, DirectoryError, InMemoryUserDirectory,
    LoginError, RoleRecord, Sha256Verifier, UserDirectory, UserRecord,
};
pub use identity::Identity;
pub use policy::{
    AccessExplanation, AccessPolicyEngine, AccessRule, Decision, DenialKind, DenialReason, MatchKind,
    RouteAccess,
};
pub use roles::Role;
pub use token::{Token, TokenError, TokenService, TokenValidator};
