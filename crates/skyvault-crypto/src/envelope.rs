//! The encrypted object envelope
//!
//! One envelope accompanies every stored object: the wrapped DEK and its IV,
//! the base IV for content chunks, the encrypted filename and MIME type, and
//! a small cleartext descriptor (`EncMeta`). Descriptor fields are not secret
//! but they are bound into every content chunk's associated data, so swapping
//! them is detected exactly like flipping ciphertext bits.
//!
//! Wire shape is camelCase JSON with base64 byte fields, matching the backend
//! API.

use crate::{
    chunked::{ChunkGeometry, ChunkedDecoder, ChunkedEncoder},
    keys::{DekKey, MasterKey},
    symmetric::{Aead, AeadCipher, Nonce},
    CryptoError, Result,
};
use serde::{Deserialize, Serialize};

/// Domain separation for the DEK wrap
const EDEK_AAD: &[u8] = b"skyvault.edek.v1";
/// Domain separation for filename encryption
const NAME_AAD: &[u8] = b"skyvault.name.v1";
/// Domain separation for MIME-type encryption
const MIME_AAD: &[u8] = b"skyvault.mime.v1";

/// Cleartext object descriptor, versioned.
///
/// One variant per supported header version; decryption dispatches on the
/// tag so old envelopes stay readable when the format evolves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "headerVersion")]
pub enum EncMeta {
    #[serde(rename = "1")]
    V1(EncMetaV1),
}

/// Version-1 descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncMetaV1 {
    /// Which AEAD sealed the content
    pub algorithm: AeadCipher,
    /// Plaintext bytes per chunk (except possibly the last)
    pub chunk_size: u32,
    /// Number of content chunks
    pub total_chunks: u32,
    /// Base IV; per-chunk IVs are derived from it by index
    pub base_iv: Nonce,
    /// Format of the associated-data string
    pub aad_version: u8,
}

impl EncMeta {
    /// Build a current-version descriptor
    pub fn new(algorithm: AeadCipher, geometry: &ChunkGeometry, base_iv: Nonce) -> Self {
        Self::V1(EncMetaV1 {
            algorithm,
            chunk_size: geometry.chunk_size,
            total_chunks: geometry.total_chunks,
            base_iv,
            aad_version: 1,
        })
    }

    /// The AEAD algorithm recorded in the descriptor
    pub fn algorithm(&self) -> AeadCipher {
        match self {
            Self::V1(v1) => v1.algorithm,
        }
    }

    /// The base IV for content chunks
    pub fn base_iv(&self) -> &Nonce {
        match self {
            Self::V1(v1) => &v1.base_iv,
        }
    }

    /// Canonical associated-data bytes binding this descriptor to every
    /// content chunk. Byte-stable by construction; the format is gated by
    /// `aad_version` rather than re-serializing the struct.
    pub fn aad_bytes(&self) -> Vec<u8> {
        match self {
            Self::V1(v1) => format!(
                "skyvault.content.v{}|{}|{}|{}|{}",
                v1.aad_version,
                v1.algorithm.algorithm_id(),
                v1.chunk_size,
                v1.total_chunks,
                v1.base_iv.to_base64url(),
            )
            .into_bytes(),
        }
    }

    /// Validate the descriptor against the declared plaintext size and
    /// produce the chunk layout. A mismatch is a tamper signal.
    pub fn geometry(&self, size_bytes: u64) -> Result<ChunkGeometry> {
        match self {
            Self::V1(v1) => ChunkGeometry::from_parts(
                v1.chunk_size,
                v1.total_chunks,
                size_bytes,
                v1.algorithm,
            ),
        }
    }
}

/// The envelope persisted alongside an object's ciphertext
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEnvelope {
    /// Base IV used for content encryption
    pub cipher_iv: Nonce,
    /// The DEK, wrapped under the account master key
    #[serde(with = "base64_serde")]
    pub edek: Vec<u8>,
    /// IV of the DEK wrap
    pub edek_iv: Nonce,
    /// Cleartext descriptor, authenticated via chunk AAD
    pub enc_meta: EncMeta,
    /// Filename, encrypted under the DEK
    #[serde(with = "base64_serde")]
    pub meta_name_enc: Vec<u8>,
    /// IV of the filename encryption
    pub meta_name_iv: Nonce,
    /// MIME type, encrypted under the DEK
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt_serde")]
    pub mime_enc: Option<Vec<u8>>,
    /// IV of the MIME-type encryption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_iv: Option<Nonce>,
    /// Hex SHA-256 of the plaintext, computed before encryption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    /// Plaintext size in bytes
    pub size_bytes: u64,
}

/// Result of sealing an object in memory
#[derive(Debug)]
pub struct SealedObject {
    pub envelope: ObjectEnvelope,
    pub ciphertext: Vec<u8>,
}

/// Result of opening an object
#[derive(Debug)]
pub struct OpenedObject {
    pub data: Vec<u8>,
    pub name: String,
    pub mime: Option<String>,
}

/// Wrap a DEK under the master key with a fresh IV
pub fn wrap_dek(dek: &DekKey, mk: &MasterKey) -> Result<(Vec<u8>, Nonce)> {
    let iv = Nonce::generate();
    let aead = Aead::with_master_key(mk, AeadCipher::default());
    let edek = aead.encrypt_with_aad(&iv, dek.as_bytes(), EDEK_AAD)?;
    Ok((edek, iv))
}

/// Unwrap an EDEK under the master key.
///
/// A tag failure means "wrong account key or corrupted data" and is the
/// canonical wrong-password signal; it is never worth retrying with the same
/// master key.
pub fn unwrap_dek(edek: &[u8], iv: &Nonce, mk: &MasterKey) -> Result<DekKey> {
    let aead = Aead::with_master_key(mk, AeadCipher::default());
    let bytes = aead.decrypt_with_aad(iv, edek, EDEK_AAD)?;
    DekKey::from_bytes(&bytes)
}

/// Encrypt a filename under the DEK with a fresh IV
pub fn encrypt_name(name: &str, dek: &DekKey, cipher: AeadCipher) -> Result<(Vec<u8>, Nonce)> {
    let iv = Nonce::generate();
    let aead = Aead::new(dek, cipher);
    let enc = aead.encrypt_with_aad(&iv, name.as_bytes(), NAME_AAD)?;
    Ok((enc, iv))
}

/// Decrypt a filename under the DEK
pub fn decrypt_name(enc: &[u8], iv: &Nonce, dek: &DekKey, cipher: AeadCipher) -> Result<String> {
    let aead = Aead::new(dek, cipher);
    let bytes = aead.decrypt_with_aad(iv, enc, NAME_AAD)?;
    String::from_utf8(bytes).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// Encrypt a MIME type under the DEK with a fresh IV
pub fn encrypt_mime(mime: &str, dek: &DekKey, cipher: AeadCipher) -> Result<(Vec<u8>, Nonce)> {
    let iv = Nonce::generate();
    let aead = Aead::new(dek, cipher);
    let enc = aead.encrypt_with_aad(&iv, mime.as_bytes(), MIME_AAD)?;
    Ok((enc, iv))
}

/// Decrypt a MIME type under the DEK
pub fn decrypt_mime(enc: &[u8], iv: &Nonce, dek: &DekKey, cipher: AeadCipher) -> Result<String> {
    let aead = Aead::new(dek, cipher);
    let bytes = aead.decrypt_with_aad(iv, enc, MIME_AAD)?;
    String::from_utf8(bytes).map_err(|e| CryptoError::Serialization(e.to_string()))
}

/// Seal a whole in-memory object: fresh DEK, fresh IVs, chunked content
/// encryption, encrypted name/MIME, DEK wrapped under the master key.
///
/// One DEK covers content, filename and MIME type for this object version;
/// a new version gets a new DEK.
pub fn seal(
    plaintext: &[u8],
    name: &str,
    mime: Option<&str>,
    mk: &MasterKey,
    cipher: AeadCipher,
    chunk_size: usize,
) -> Result<SealedObject> {
    let dek = DekKey::generate();
    let base_iv = Nonce::generate();
    let geometry = ChunkGeometry::for_size(plaintext.len() as u64, chunk_size, cipher);
    let enc_meta = EncMeta::new(cipher, &geometry, base_iv.clone());

    let mut encoder = ChunkedEncoder::new(
        &dek,
        cipher,
        base_iv.clone(),
        enc_meta.aad_bytes(),
        geometry.chunk_size as usize,
    );
    let mut ciphertext = Vec::with_capacity(geometry.total_ciphertext_len() as usize);
    for chunk in encoder.update(plaintext)? {
        ciphertext.extend_from_slice(&chunk.ciphertext);
    }
    let (last, summary) = encoder.finalize()?;
    if let Some(chunk) = last {
        ciphertext.extend_from_slice(&chunk.ciphertext);
    }

    let (meta_name_enc, meta_name_iv) = encrypt_name(name, &dek, cipher)?;
    let (mime_enc, mime_iv) = match mime {
        Some(mime) => {
            let (enc, iv) = encrypt_mime(mime, &dek, cipher)?;
            (Some(enc), Some(iv))
        }
        None => (None, None),
    };
    let (edek, edek_iv) = wrap_dek(&dek, mk)?;

    Ok(SealedObject {
        envelope: ObjectEnvelope {
            cipher_iv: base_iv,
            edek,
            edek_iv,
            enc_meta,
            meta_name_enc,
            meta_name_iv,
            mime_enc,
            mime_iv,
            content_sha256: Some(summary.content_sha256),
            size_bytes: summary.total_size,
        },
        ciphertext,
    })
}

/// Open a whole object with the account master key
pub fn open(envelope: &ObjectEnvelope, ciphertext: &[u8], mk: &MasterKey) -> Result<OpenedObject> {
    let dek = unwrap_dek(&envelope.edek, &envelope.edek_iv, mk)?;
    open_with_dek(envelope, ciphertext, &dek)
}

/// Open a whole object with an already-recovered DEK (the share-link path:
/// the recipient never holds the owner's master key).
pub fn open_with_dek(
    envelope: &ObjectEnvelope,
    ciphertext: &[u8],
    dek: &DekKey,
) -> Result<OpenedObject> {
    let cipher = envelope.enc_meta.algorithm();
    let geometry = envelope.enc_meta.geometry(envelope.size_bytes)?;
    if ciphertext.len() as u64 != geometry.total_ciphertext_len() {
        return Err(CryptoError::InvalidEnvelope(format!(
            "ciphertext is {} bytes, descriptor implies {}",
            ciphertext.len(),
            geometry.total_ciphertext_len()
        )));
    }

    let mut decoder = ChunkedDecoder::new(
        dek,
        cipher,
        envelope.enc_meta.base_iv().clone(),
        envelope.enc_meta.aad_bytes(),
        geometry,
    );
    let mut data = Vec::with_capacity(envelope.size_bytes as usize);
    let mut offset = 0usize;
    let mut index = 0u32;
    while let Some(len) = decoder.next_ciphertext_len() {
        let chunk = &ciphertext[offset..offset + len];
        data.extend_from_slice(&decoder.decrypt_chunk(index, chunk)?);
        offset += len;
        index += 1;
    }
    decoder.finalize(envelope.content_sha256.as_deref())?;

    let name = decrypt_name(&envelope.meta_name_enc, &envelope.meta_name_iv, dek, cipher)?;
    let mime = match (&envelope.mime_enc, &envelope.mime_iv) {
        (Some(enc), Some(iv)) => Some(decrypt_mime(enc, iv, dek, cipher)?),
        (None, None) => None,
        _ => {
            return Err(CryptoError::InvalidEnvelope(
                "mimeEnc and mimeIv must be present together".to_string(),
            ))
        }
    };

    Ok(OpenedObject { data, name, mime })
}

/// Serialize byte fields as standard base64 strings in JSON
pub(crate) mod base64_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

/// `Option<Vec<u8>>` variant of [`base64_serde`]
pub(crate) mod base64_opt_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => {
                s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s = Option::<String>::deserialize(d)?;
        s.map(|s| {
            base64::engine::general_purpose::STANDARD
                .decode(&s)
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
    use crate::kdf::{derive_master_key, KdfParams};

    fn master_key(password: &str) -> MasterKey {
        let params = KdfParams::new(vec![0x42; 16], 600_000).unwrap();
        derive_master_key(password, &params).unwrap()
    }

    fn quick_master_key(seed: u8) -> MasterKey {
        MasterKey::from_bytes(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let mk = quick_master_key(1);
        let sealed = seal(
            b"some file content",
            "report.pdf",
            Some("application/pdf"),
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        let opened = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap();
        assert_eq!(opened.data, b"some file content");
        assert_eq!(opened.name, "report.pdf");
        assert_eq!(opened.mime.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn test_hello_roundtrip_with_derived_key() {
        // Password-derived key end to end: "hello" in "a.txt" out
        let mk = master_key("correct-horse");
        let sealed = seal(
            b"hello",
            "a.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        let opened = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap();
        assert_eq!(opened.data, b"hello");
        assert_eq!(opened.name, "a.txt");
        assert_eq!(opened.mime, None);
    }

    #[test]
    fn test_wrong_password_key_fails() {
        let mk_a = master_key("correct-horse");
        let mk_b = master_key("wrong-horse");

        let sealed = seal(
            b"hello",
            "a.txt",
            None,
            &mk_a,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        let err = open(&sealed.envelope, &sealed.ciphertext, &mk_b).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_multi_chunk_seal_open() {
        let mk = quick_master_key(2);
        let plaintext = vec![0x5au8; MIN_CHUNK_SIZE * 2 + 99];
        let sealed = seal(
            &plaintext,
            "big.bin",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            MIN_CHUNK_SIZE,
        )
        .unwrap();

        match &sealed.envelope.enc_meta {
            EncMeta::V1(v1) => assert_eq!(v1.total_chunks, 3),
        }
        let opened = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap();
        assert_eq!(opened.data, plaintext);
    }

    #[test]
    fn test_chacha_envelope_roundtrip() {
        let mk = quick_master_key(3);
        let sealed = seal(
            b"chacha content",
            "c.txt",
            None,
            &mk,
            AeadCipher::ChaCha20Poly1305,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();
        let opened = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap();
        assert_eq!(opened.data, b"chacha content");
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let mk = quick_master_key(4);
        let mut sealed = seal(
            b"tamper target",
            "t.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        sealed.ciphertext[0] ^= 0x80;
        let err = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_tampered_edek_detected() {
        let mk = quick_master_key(5);
        let mut sealed = seal(
            b"tamper target",
            "t.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        sealed.envelope.edek[0] ^= 0x01;
        let err = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_tampered_cipher_iv_detected() {
        let mk = quick_master_key(6);
        let mut sealed = seal(
            b"tamper target",
            "t.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        // Flip a bit in the base IV both where the chunks derive from and in
        // the descriptor copy, simulating a consistent swap by the server
        let mut iv = *sealed.envelope.cipher_iv.as_bytes();
        iv[0] ^= 0x01;
        let flipped = Nonce::from_bytes(&iv).unwrap();
        sealed.envelope.cipher_iv = flipped.clone();
        match &mut sealed.envelope.enc_meta {
            EncMeta::V1(v1) => v1.base_iv = flipped,
        }

        let err = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_tampered_enc_meta_detected() {
        let mk = quick_master_key(7);
        let plaintext = vec![9u8; MIN_CHUNK_SIZE + 1];
        let mut sealed = seal(
            &plaintext,
            "t.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            MIN_CHUNK_SIZE,
        )
        .unwrap();

        // Claim a different chunk count; either the geometry check or the
        // chunk AAD must catch it
        match &mut sealed.envelope.enc_meta {
            EncMeta::V1(v1) => v1.total_chunks = 1,
        }
        let err = open(&sealed.envelope, &sealed.ciphertext, &mk).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::WrongKeyOrCorrupted | CryptoError::InvalidEnvelope(_)
        ));
    }

    #[test]
    fn test_envelope_json_roundtrip() {
        let mk = quick_master_key(8);
        let sealed = seal(
            b"wire format",
            "w.txt",
            Some("text/plain"),
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        let json = serde_json::to_string(&sealed.envelope).unwrap();
        // camelCase ABI fields
        assert!(json.contains("\"cipherIv\""));
        assert!(json.contains("\"edekIv\""));
        assert!(json.contains("\"metaNameEnc\""));
        assert!(json.contains("\"headerVersion\":\"1\""));

        let back: ObjectEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sealed.envelope);

        let opened = open(&back, &sealed.ciphertext, &mk).unwrap();
        assert_eq!(opened.data, b"wire format");
    }

    #[test]
    fn test_fresh_dek_and_ivs_per_seal() {
        let mk = quick_master_key(9);
        let a = seal(b"x", "f", None, &mk, AeadCipher::Aes256Gcm, DEFAULT_CHUNK_SIZE).unwrap();
        let b = seal(b"x", "f", None, &mk, AeadCipher::Aes256Gcm, DEFAULT_CHUNK_SIZE).unwrap();

        assert_ne!(a.envelope.edek, b.envelope.edek);
        assert_ne!(a.envelope.cipher_iv, b.envelope.cipher_iv);
        assert_ne!(a.envelope.meta_name_iv, b.envelope.meta_name_iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_share_path_opens_without_master_key() {
        let mk = quick_master_key(10);
        let sealed = seal(
            b"shared bytes",
            "s.txt",
            None,
            &mk,
            AeadCipher::Aes256Gcm,
            DEFAULT_CHUNK_SIZE,
        )
        .unwrap();

        let dek = unwrap_dek(&sealed.envelope.edek, &sealed.envelope.edek_iv, &mk).unwrap();
        let opened = open_with_dek(&sealed.envelope, &sealed.ciphertext, &dek).unwrap();
        assert_eq!(opened.data, b"shared bytes");
        assert_eq!(opened.name, "s.txt");
    }
}
