//! Login-time credential checks.
//!
//! User and role storage is an external collaborator: the gate only needs to
//! look a user up and ask a one-way verifier whether the presented password
//! matches what is stored. [`InMemoryUserDirectory`] and [`Sha256Verifier`]
//! are the development implementations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{Identity, Role};

/// A stored user account.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub roles: BTreeSet<Role>,
    pub active: bool,
    /// Opaque stored credential, understood only by the verifier.
    pub credential: String,
}

impl core::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Read access to user and role records.
pub trait UserDirectory: Send + Sync {
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, DirectoryError>;

    fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError>;

    fn list_roles(&self) -> Result<Vec<RoleRecord>, DirectoryError>;
}

/// One-way credential check. The hashing scheme is the implementor's choice.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, presented: &str, stored: &str) -> bool;
}

/// SHA-256 digest verifier for development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Verifier;

impl Sha256Verifier {
    pub fn hash(password: &str) -> String {
        STANDARD.encode(Sha256::digest(password.as_bytes()))
    }
}

impl CredentialVerifier for Sha256Verifier {
    fn verify(&self, presented: &str, stored: &str) -> bool {
        let presented = Self::hash(presented);
        presented.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<String, UserRecord>>,
    roles: RwLock<BTreeMap<String, RoleRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory seeded with the `ADMIN` and `USER` roles.
    pub fn with_default_roles() -> Self {
        let dir = Self::new();
        dir.insert_role(Role::ADMIN, Some("Administrator role with full access"));
        dir.insert_role(Role::USER, Some("Regular user role"));
        dir
    }

    pub fn insert_role(&self, role: Role, description: Option<&str>) {
        let record = RoleRecord {
            name: role.to_string(),
            description: description.map(str::to_string),
        };
        if let Ok(mut roles) = self.roles.write() {
            roles.insert(record.name.clone(), record);
        }
    }

    /// Add (or replace) an active user whose password is hashed with
    /// [`Sha256Verifier`].
    pub fn insert_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        roles: impl IntoIterator<Item = Role>,
    ) {
        self.insert_record(UserRecord {
            username: username.to_string(),
            email: email.to_string(),
            roles: roles.into_iter().collect(),
            active: true,
            credential: Sha256Verifier::hash(password),
        });
    }

    pub fn insert_record(&self, record: UserRecord) {
        if let Ok(mut users) = self.users.write() {
            users.insert(record.username.clone(), record);
        }
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_user(&self, username: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::Unavailable("user table lock poisoned".to_string()))?;
        Ok(users.get(username).cloned())
    }

    fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::Unavailable("user table lock poisoned".to_string()))?;
        Ok(users.values().cloned().collect())
    }

    fn list_roles(&self) -> Result<Vec<RoleRecord>, DirectoryError> {
        let roles = self
            .roles
            .read()
            .map_err(|_| DirectoryError::Unavailable("role table lock poisoned".to_string()))?;
        Ok(roles.values().cloned().collect())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// Unknown user, wrong password or disabled account. Deliberately not
    /// distinguished.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Result of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub identity: Identity,
    pub email: String,
}

/// Username/password authentication against a [`UserDirectory`].
#[derive(Clone)]
pub struct Authenticator {
    directory: Arc<dyn UserDirectory>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl Authenticator {
    pub fn new(directory: Arc<dyn UserDirectory>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { directory, verifier }
    }

    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<AuthenticatedUser, LoginError> {
        let record = self
            .directory
            .find_user(username)?
            .ok_or(LoginError::InvalidCredentials)?;

        if !record.active {
            tracing::debug!(username, "login refused for disabled account");
            return Err(LoginError::InvalidCredentials);
        }
        if !self.verifier.verify(password, &record.credential) {
            return Err(LoginError::InvalidCredentials);
        }

        Ok(AuthenticatedUser {
            identity: Identity::new(record.username, record.roles),
            email: record.email,
        })
    }
}
