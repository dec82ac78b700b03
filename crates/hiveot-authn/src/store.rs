//! Credential stores consulted by `Login`.
//!
//! Password storage is owned by an external collaborator; the gateway only
//! needs a yes/no answer for a `(loginID, password)` pair. Hashes are argon2id
//! in PHC string format, `$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`.

use std::collections::HashMap;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use hiveot_kernel::{HubError, HubResult};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Answers whether a password belongs to a login.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(())` on a match, `Unauthorized` otherwise.
    async fn verify_password(&self, login_id: &str, password: &str) -> HubResult<()>;
}

/// One configured login: the ID and the PHC string of its password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub login_id: String,
    pub password_hash: String,
}

/// Argon2id hash of `password` with a random salt, as a PHC string.
pub fn hash_password(password: &str) -> HubResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HubError::internal(format!("hash password: {e}")))
}

/// In-memory store of password hashes.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    hashes: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store for the configured logins. Fails on the first malformed hash.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a UserEntry>) -> HubResult<Self> {
        let store = Self::new();
        for entry in entries {
            store.set_hash(&entry.login_id, &entry.password_hash)?;
        }
        Ok(store)
    }

    /// Add or replace a login with a plain text password.
    pub fn add_user(&self, login_id: &str, password: &str) -> HubResult<()> {
        let hash = hash_password(password)?;
        self.hashes.write().insert(login_id.to_string(), hash);
        Ok(())
    }

    pub fn set_hash(&self, login_id: &str, password_hash: &str) -> HubResult<()> {
        PasswordHash::new(password_hash)
            .map_err(|e| HubError::invalid_input(format!("password hash of '{login_id}': {e}")))?;
        self.hashes
            .write()
            .insert(login_id.to_string(), password_hash.to_string());
        Ok(())
    }

    pub fn remove_user(&self, login_id: &str) -> bool {
        self.hashes.write().remove(login_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn verify_password(&self, login_id: &str, password: &str) -> HubResult<()> {
        if login_id.is_empty() {
            return Err(HubError::unauthorized("missing login ID"));
        }
        let stored = self.hashes.read().get(login_id).cloned();
        let matches = stored.is_some_and(|stored| {
            PasswordHash::new(&stored)
                .is_ok_and(|hash| Argon2::default().verify_password(password.as_bytes(), &hash).is_ok())
        });
        if matches {
            Ok(())
        } else {
            Err(HubError::unauthorized(format!("invalid password for '{login_id}'")))
        }
    }
}
