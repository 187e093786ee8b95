//! # Skyvault Crypto
//!
//! Cryptographic core for the Skyvault cloud-storage client.
//!
//! This crate provides:
//! - **Master-key derivation**: PBKDF2-HMAC-SHA256 from the account password
//!   and server-issued parameters
//! - **Envelope encryption**: a random DEK per object encrypts content and
//!   filename; the DEK itself is wrapped under the master key
//! - **Chunked streaming**: large objects are encrypted and verified chunk by
//!   chunk with index-derived nonces
//! - **Share secrets**: the URL-fragment bundle that lets a recipient decrypt
//!   without the owner's master key
//!
//! ## Security Model
//!
//! The storage backend is untrusted: it only ever sees ciphertext, wrapped
//! keys, and a cleartext chunk descriptor that is authenticated into every
//! content chunk. The master key never leaves the client, and share links
//! carry their key material after the `#`, which HTTP clients do not send.

pub mod chunked;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod share;
pub mod symmetric;

pub use chunked::{
    clamp_chunk_size, sha256_hex, ChunkGeometry, ChunkedDecoder, ChunkedEncoder, EncodeSummary,
    EncryptedChunk, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
pub use envelope::{
    open, open_with_dek, seal, unwrap_dek, wrap_dek, EncMeta, EncMetaV1, ObjectEnvelope,
    OpenedObject, SealedObject,
};
pub use error::{CryptoError, Result};
pub use kdf::{derive_master_key, KdfAlgorithm, KdfParams, DEFAULT_KDF_ITERATIONS};
pub use keys::{DekKey, MasterKey, KEY_SIZE, NONCE_SIZE};
pub use share::{append_fragment, split_fragment, ShareSecret};
pub use symmetric::{Aead, AeadCipher, Nonce};
