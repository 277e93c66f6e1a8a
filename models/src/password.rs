// models/src/password.rs

use std::fmt;

use bcrypt::{hash, verify, BcryptError};
use serde::{Deserialize, Serialize};

use crate::errors::{ClinicError, ClinicResult};

/// bcrypt work factor used for account passwords.
pub const PASSWORD_HASH_COST: u32 = 12;

/// An account credential: the bcrypt hash that is persisted, plus the plaintext
/// it was derived from while the account is still being validated.
///
/// The plaintext is skipped by serde, so it never reaches storage or a response.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password {
    #[serde(skip)]
    plaintext: Option<String>,
    hash: Option<String>,
}

impl Password {
    /// Wraps a hash loaded from storage.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Password {
            plaintext: None,
            hash: Some(hash.into()),
        }
    }

    /// Hashes `plaintext` with the default work factor.
    pub fn set(&mut self, plaintext: &str) -> ClinicResult<()> {
        self.set_with_cost(plaintext, PASSWORD_HASH_COST)
    }

    pub fn set_with_cost(&mut self, plaintext: &str, cost: u32) -> ClinicResult<()> {
        let hashed = hash(plaintext, cost)?;
        self.plaintext = Some(plaintext.to_string());
        self.hash = Some(hashed);
        Ok(())
    }

    /// `Ok(false)` on a mismatch. Errors are reserved for a missing or corrupt hash.
    pub fn matches(&self, plaintext: &str) -> ClinicResult<bool> {
        let stored = self
            .hash
            .as_deref()
            .ok_or_else(|| ClinicError::InternalError("password hash is not set".to_string()))?;
        match verify(plaintext, stored) {
            Ok(ok) => Ok(ok),
            Err(BcryptError::InvalidHash(h)) => Err(ClinicError::InternalError(format!(
                "stored password hash is corrupt: {}",
                h
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref()
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.hash.is_some()
    }

    /// Forgets the plaintext once it is no longer needed for validation.
    pub fn clear_plaintext(&mut self) {
        self.plaintext = None;
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "<redacted>"))
            .field("hash", &self.hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
