//! Error types for the skyvault-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// KDF parameters missing or malformed at session start. Fatal to every
    /// crypto operation until a fresh set is obtained from the server.
    #[error("key derivation parameters invalid: {0}")]
    InvalidKdfParams(String),

    /// An AEAD authentication tag failed during DEK unwrap or content/name
    /// decryption. Indistinguishable between "wrong account key" and
    /// "tampered or corrupted data"; no plaintext is ever returned.
    #[error("cannot decrypt: wrong key or corrupted data")]
    WrongKeyOrCorrupted,

    /// Share fragment missing fields or failing structural validation
    #[error("malformed share link: {0}")]
    MalformedShareLink(String),

    /// Plaintext digest check failed after AEAD verification succeeded
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid nonce
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Envelope descriptor inconsistent with the object it describes
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
