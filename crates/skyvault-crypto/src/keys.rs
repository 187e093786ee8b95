//! Key material for the Skyvault envelope scheme
//!
//! Two key types exist:
//! - `MasterKey`: derived from the account password, wraps DEKs. Held in
//!   process memory for the session, never persisted or transmitted.
//! - `DekKey`: random per-object key that encrypts content and filename;
//!   persisted only in wrapped (EDEK) form.

use crate::{CryptoError, Result};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM/ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// The per-account master key, derived from the user's password.
///
/// There is deliberately no `generate()`: a master key only ever comes out of
/// the KDF, so two devices with the same password and parameters agree on it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Create from raw derived bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "master key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    pub(crate) fn from_array(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "MasterKey(..)")
    }
}

/// A Data Encryption Key (DEK) for symmetric encryption of one object
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DekKey {
    key: [u8; KEY_SIZE],
}

impl DekKey {
    /// Generate a new random DEK
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a DEK from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "DEK must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Encode as base64url without padding (the share-fragment alphabet)
    pub fn to_base64url(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.key)
    }

    /// Decode from base64url without padding
    pub fn from_base64url(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for DekKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DekKey(..)")
    }
}
