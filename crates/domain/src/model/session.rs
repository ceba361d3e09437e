use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use super::AccountId;

/// Raw random bytes behind a bearer token.
pub const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
#[error("failed to gather randomness: {0}")]
pub struct EntropyError(String);

/// Opaque bearer token handed to a client once at sign-in. Only its
/// fingerprint is ever persisted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Result<Self, EntropyError> {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        getrandom::fill(&mut bytes).map_err(|err| EntropyError(err.to_string()))?;
        Ok(Self(hex_encode(bytes)))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn fingerprint(&self) -> SessionFingerprint {
        SessionFingerprint(derive_fingerprint(&self.0))
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// SHA3-256 hex digest of a session token; the storage key for sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionFingerprint(String);

impl SessionFingerprint {
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministically derives a SHA3-256 fingerprint for a secret.
pub fn derive_fingerprint(secret: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(secret.as_bytes());
    hex_encode(hasher.finalize())
}

/// Picks a uniformly random index below `len` from the OS RNG.
pub fn random_index(len: usize) -> Result<usize, EntropyError> {
    if len == 0 {
        return Ok(0);
    }
    let value = getrandom::u32().map_err(|err| EntropyError(err.to_string()))?;
    Ok(value as usize % len)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub fingerprint: SessionFingerprint,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub fingerprint: SessionFingerprint,
    pub account_id: AccountId,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}
