//! Authenticated symmetric encryption using AES-GCM and ChaCha20-Poly1305
//!
//! Everything the envelope scheme encrypts (content chunks, filenames, MIME
//! types, and the DEK itself) goes through the `Aead` wrapper in this module.

use crate::{
    keys::{DekKey, MasterKey, KEY_SIZE, NONCE_SIZE},
    CryptoError, Result,
};
use aes_gcm::{aead::Aead as AeadTrait, Aes256Gcm, KeyInit};
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

// Nonces travel as base64 strings in wire JSON
impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        use base64::Engine;
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(self.bytes))
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        use base64::Engine;
        let s = String::deserialize(d)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Derive the nonce for one content chunk from this base nonce.
    ///
    /// Counter-appended construction: the first 8 bytes of the base nonce are
    /// kept and the last 4 are replaced with the big-endian chunk index. The
    /// derivation is a pure function of (base, index), so chunks can be
    /// processed in any order without a shared counter, and no two chunks of
    /// the same object share a nonce.
    pub fn for_chunk(&self, index: u32) -> Self {
        let mut bytes = self.bytes;
        bytes[8..].copy_from_slice(&index.to_be_bytes());
        Self { bytes }
    }

    /// Encode as base64url without padding
    pub fn to_base64url(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.bytes)
    }

    /// Decode from base64url without padding
    pub fn from_base64url(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

/// Supported AEAD ciphers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AeadCipher {
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl Default for AeadCipher {
    fn default() -> Self {
        Self::Aes256Gcm
    }
}

impl AeadCipher {
    /// Get the algorithm identifier string
    pub fn algorithm_id(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
        }
    }

    /// Get the authentication tag size
    pub fn tag_size(&self) -> usize {
        16 // Both use 128-bit tags
    }
}

/// AEAD encryption/decryption interface
pub struct Aead {
    cipher: AeadCipher,
    key: [u8; KEY_SIZE],
}

impl Aead {
    /// Create an AEAD instance keyed by a per-object DEK
    pub fn new(key: &DekKey, cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: *key.as_bytes(),
        }
    }

    /// Create an AEAD instance keyed by the master key (DEK wrapping only)
    pub fn with_master_key(key: &MasterKey, cipher: AeadCipher) -> Self {
        Self {
            cipher,
            key: *key.as_bytes(),
        }
    }

    /// Create with the default cipher (AES-256-GCM)
    pub fn new_default(key: &DekKey) -> Self {
        Self::new(key, AeadCipher::default())
    }

    /// Encrypt data with the given nonce and associated data
    pub fn encrypt_with_aad(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
                let payload = aes_gcm::aead::Payload { msg: plaintext, aad };
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
            AeadCipher::ChaCha20Poly1305 => {
                let nonce_arr = chacha20poly1305::Nonce::from_slice(nonce.as_bytes());
                let payload = chacha20poly1305::aead::Payload { msg: plaintext, aad };
                let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .encrypt(nonce_arr, payload)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))
            }
        }
    }

    /// Encrypt data with the given nonce
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(nonce, plaintext, &[])
    }

    /// Decrypt data with the given nonce and associated data.
    ///
    /// A tag failure always surfaces as `WrongKeyOrCorrupted` — the cipher
    /// cannot tell a wrong key from tampered ciphertext, and neither case
    /// yields any plaintext.
    pub fn decrypt_with_aad(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        match self.cipher {
            AeadCipher::Aes256Gcm => {
                let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
                let payload = aes_gcm::aead::Payload {
                    msg: ciphertext,
                    aad,
                };
                let cipher = Aes256Gcm::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .decrypt(nonce_arr, payload)
                    .map_err(|_| CryptoError::WrongKeyOrCorrupted)
            }
            AeadCipher::ChaCha20Poly1305 => {
                let nonce_arr = chacha20poly1305::Nonce::from_slice(nonce.as_bytes());
                let payload = chacha20poly1305::aead::Payload {
                    msg: ciphertext,
                    aad,
                };
                let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?;
                cipher
                    .decrypt(nonce_arr, payload)
                    .map_err(|_| CryptoError::WrongKeyOrCorrupted)
            }
        }
    }

    /// Decrypt data with the given nonce
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(nonce, ciphertext, &[])
    }

    /// Get the cipher type
    pub fn cipher(&self) -> AeadCipher {
        self.cipher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_aes_gcm_roundtrip() {
        let key = DekKey::generate();
        let plaintext = b"Hello, World!";
        let nonce = Nonce::generate();

        let aead = Aead::new_default(&key);
        let ciphertext = aead.encrypt(&nonce, plaintext).unwrap();
        let decrypted = aead.decrypt(&nonce, &ciphertext).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_chacha20_poly1305_roundtrip() {
        let key = DekKey::generate();
        let plaintext = b"Hello, World!";
        let nonce = Nonce::generate();

        let aead = Aead::new(&key, AeadCipher::ChaCha20Poly1305);
        let ciphertext = aead.encrypt(&nonce, plaintext).unwrap();
        let decrypted = aead.decrypt(&nonce, &ciphertext).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = Nonce::generate();
        let aead = Aead::new_default(&DekKey::generate());
        let ciphertext = aead.encrypt(&nonce, b"secret").unwrap();

        let other = Aead::new_default(&DekKey::generate());
        let err = other.decrypt(&nonce, &ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = DekKey::generate();
        let nonce = Nonce::generate();

        let aead = Aead::new_default(&key);
        let ciphertext = aead
            .encrypt_with_aad(&nonce, b"secret data", b"correct aad")
            .unwrap();
        let err = aead
            .decrypt_with_aad(&nonce, &ciphertext, b"wrong aad")
            .unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_chunk_nonce_derivation() {
        let base = Nonce::from_bytes(&[9, 9, 9, 9, 9, 9, 9, 9, 0, 0, 0, 0]).unwrap();
        let n0 = base.for_chunk(0);
        let n1 = base.for_chunk(1);
        let n256 = base.for_chunk(256);

        assert_eq!(&n0.as_bytes()[..8], &base.as_bytes()[..8]);
        assert_eq!(n0.as_bytes()[8..], [0, 0, 0, 0]);
        assert_eq!(n1.as_bytes()[8..], [0, 0, 0, 1]);
        assert_eq!(n256.as_bytes()[8..], [0, 0, 1, 0]);

        // Index-pure: re-deriving yields the same nonce
        assert_eq!(base.for_chunk(1), n1);
    }

    #[test]
    fn test_chunk_nonces_distinct() {
        let base = Nonce::generate();
        let mut seen = HashSet::new();
        for index in 0..1000 {
            assert!(seen.insert(*base.for_chunk(index).as_bytes()));
        }
    }

    #[test]
    fn test_random_nonces_never_repeat() {
        // Across many generation calls, no (key, IV) reuse
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(*Nonce::generate().as_bytes()));
        }
    }
}
