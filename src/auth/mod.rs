//! Login credentials.
//!
//! Each `[[users]]` entry carries either a plaintext secret or an Argon2id
//! PHC string. Every check costs exactly one Argon2 verification, whether the
//! username is unknown, plaintext or hashed, so response time does not tell
//! which usernames exist.

use crate::config::types::UserConfig;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

/// Verified against when there is no real hash to check, with the same cost
/// as [`HashCost::default`].
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user '{0}' has no password configured")]
    MissingSecret(String),
    #[error("duplicate username: {0}")]
    DuplicateUser(String),
    #[error("invalid argon2 parameters: {0}")]
    InvalidCost(String),
    #[error("failed to hash password: {0}")]
    Hash(String),
}

/// Argon2id cost for newly hashed secrets. Verification always uses the cost
/// recorded in the PHC string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub lanes: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            lanes: 1,
        }
    }
}

impl HashCost {
    /// Hash `password` into a PHC string suitable for `password_hash`.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let params = Params::new(self.memory_kib, self.iterations, self.lanes, None)
            .map_err(|e| AuthError::InvalidCost(e.to_string()))?;
        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .map(|phc| phc.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }
}

/// Check `password` against a PHC string. Unparseable hashes never match.
pub fn verify_hash(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable password hash");
            false
        }
    }
}

/// Source of truth for login checks.
///
/// Implementations must be side-effect free: an unknown username is a plain
/// `false`, never an error.
pub trait CredentialStore: Send + Sync {
    fn validate(&self, username: &str, secret: &str) -> bool;

    /// Number of known accounts (reported at startup).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

enum Secret {
    Plain(Zeroizing<String>),
    Hashed(String),
}

impl Secret {
    fn from_user(user: &UserConfig) -> Result<Self, AuthError> {
        match (&user.password, &user.password_hash) {
            (_, Some(phc)) => Ok(Secret::Hashed(phc.clone())),
            (Some(plain), None) => Ok(Secret::Plain(Zeroizing::new(plain.clone()))),
            (None, None) => Err(AuthError::MissingSecret(user.username.clone())),
        }
    }

    /// Hash that one check runs Argon2 against.
    fn phc(&self) -> &str {
        match self {
            Secret::Hashed(phc) => phc,
            Secret::Plain(_) => DUMMY_HASH,
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        let hash_ok = verify_hash(candidate, self.phc());
        match self {
            Secret::Hashed(_) => hash_ok,
            Secret::Plain(expected) => bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())),
        }
    }
}

/// In-memory credential table built from `[[users]]`. Immutable for the
/// lifetime of the process.
#[derive(Default)]
pub struct ConfigCredentialStore {
    users: HashMap<String, Secret>,
}

impl ConfigCredentialStore {
    pub fn from_config(users: &[UserConfig]) -> Result<Self, AuthError> {
        let mut map = HashMap::with_capacity(users.len());
        for user in users {
            let secret = Secret::from_user(user)?;
            if map.insert(user.username.clone(), secret).is_some() {
                return Err(AuthError::DuplicateUser(user.username.clone()));
            }
        }
        Ok(Self { users: map })
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn validate(&self, username: &str, secret: &str) -> bool {
        let valid = match self.users.get(username) {
            Some(stored) => stored.matches(secret),
            None => {
                let _ = verify_hash(secret, DUMMY_HASH);
                false
            }
        };
        tracing::debug!(user = %username, valid, "Credential check");
        valid
    }

    fn len(&self) -> usize {
        self.users.len()
    }
}
