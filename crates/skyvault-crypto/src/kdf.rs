//! Password-based master-key derivation
//!
//! The server issues per-account KDF parameters (salt + iteration count) at
//! account initialization. They are public but integrity-relevant: a changed
//! iteration count derives a different key, so callers must fetch them fresh
//! for the current account and never reuse another account's set.

use crate::{keys::MasterKey, CryptoError, Result};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

/// Default iteration count, matching the login flow's fallback
pub const DEFAULT_KDF_ITERATIONS: u32 = 600_000;

/// Lowest iteration count accepted from the server. Anything below this is
/// treated as a malformed parameter set, not a tuning choice.
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Minimum salt length in bytes
pub const MIN_SALT_LEN: usize = 16;

/// Supported password KDFs. Closed set: decryption of old accounts must
/// dispatch exhaustively on this when the scheme evolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KdfAlgorithm {
    /// PBKDF2 with HMAC-SHA-256
    Pbkdf2HmacSha256,
}

impl Default for KdfAlgorithm {
    fn default() -> Self {
        Self::Pbkdf2HmacSha256
    }
}

/// Server-issued key-derivation parameters for one account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Per-account random salt
    #[serde(with = "crate::envelope::base64_serde")]
    pub salt: Vec<u8>,
    /// Iteration count
    pub iterations: u32,
    /// Which KDF to run
    #[serde(default)]
    pub algorithm: KdfAlgorithm,
}

impl KdfParams {
    /// Create a parameter set, validating it in the process
    pub fn new(salt: Vec<u8>, iterations: u32) -> Result<Self> {
        let params = Self {
            salt,
            iterations,
            algorithm: KdfAlgorithm::default(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Check that the server sent something usable. A silently-wrong master
    /// key would surface as "wrong password" on every later operation, so
    /// malformed parameters fail here instead.
    pub fn validate(&self) -> Result<()> {
        if self.salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::InvalidKdfParams(format!(
                "salt must be at least {} bytes, got {}",
                MIN_SALT_LEN,
                self.salt.len()
            )));
        }
        if self.iterations < MIN_KDF_ITERATIONS {
            return Err(CryptoError::InvalidKdfParams(format!(
                "iteration count {} below minimum {}",
                self.iterations, MIN_KDF_ITERATIONS
            )));
        }
        Ok(())
    }
}

/// Derive the account master key from the password and server parameters.
///
/// Pure and deterministic: the same inputs always yield the same key, which
/// is what lets the server stay decryption-agnostic. The caller owns caching
/// and erasure of the result. This is a long synchronous CPU-bound call;
/// run it on a blocking thread.
pub fn derive_master_key(password: &str, params: &KdfParams) -> Result<MasterKey> {
    params.validate()?;
    let mut out = [0u8; crate::keys::KEY_SIZE];
    match params.algorithm {
        KdfAlgorithm::Pbkdf2HmacSha256 => {
            pbkdf2_hmac::<Sha256>(password.as_bytes(), &params.salt, params.iterations, &mut out);
        }
    }
    Ok(MasterKey::from_array(out))
}
