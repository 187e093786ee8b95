//! Chunked content encryption for large objects
//!
//! Content is split into fixed-size chunks; each chunk is AEAD-encrypted
//! under the object's DEK with a nonce derived from the object's base IV and
//! the chunk index. Chunks can therefore be streamed to the network as they
//! are produced, and verified one at a time as they arrive — corruption is
//! caught at the first bad chunk instead of after the whole download.
//!
//! A running SHA-256 of the plaintext is kept on both sides. It is a second
//! integrity check behind the AEAD tags, mostly useful for catching
//! client-side bugs rather than adversarial tampering.

use crate::{
    keys::DekKey,
    symmetric::{Aead, AeadCipher, Nonce},
    CryptoError, Result,
};
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Default chunk size: 256 KB
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Minimum chunk size: 64 KB
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum chunk size: 16 MB
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Clamp a requested chunk size into the supported range
pub fn clamp_chunk_size(chunk_size: usize) -> usize {
    chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

/// Hex SHA-256 of an in-memory plaintext (the `contentSha256` field)
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Chunk layout of one encrypted object.
///
/// Derived from the cleartext descriptor; every length computed here is
/// cross-checked against what actually arrives, since a descriptor that
/// disagrees with its ciphertext is a tamper signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkGeometry {
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub total_size: u64,
    pub tag_size: u32,
}

impl ChunkGeometry {
    /// Compute the layout for a plaintext of `total_size` bytes.
    ///
    /// An empty object still occupies one (empty) chunk so that its content
    /// is authenticated like any other.
    pub fn for_size(total_size: u64, chunk_size: usize, cipher: AeadCipher) -> Self {
        let chunk_size = clamp_chunk_size(chunk_size) as u32;
        let total_chunks = if total_size == 0 {
            1
        } else {
            total_size.div_ceil(u64::from(chunk_size)) as u32
        };
        Self {
            chunk_size,
            total_chunks,
            total_size,
            tag_size: cipher.tag_size() as u32,
        }
    }

    /// Reconstruct from descriptor fields, validating consistency
    pub fn from_parts(
        chunk_size: u32,
        total_chunks: u32,
        total_size: u64,
        cipher: AeadCipher,
    ) -> Result<Self> {
        let geometry = Self {
            chunk_size,
            total_chunks,
            total_size,
            tag_size: cipher.tag_size() as u32,
        };
        let expected = Self::for_size(total_size, chunk_size as usize, cipher);
        if chunk_size as usize != clamp_chunk_size(chunk_size as usize) {
            return Err(CryptoError::InvalidEnvelope(format!(
                "chunk size {} outside supported range",
                chunk_size
            )));
        }
        if expected.total_chunks != total_chunks {
            return Err(CryptoError::InvalidEnvelope(format!(
                "descriptor claims {} chunks but {} bytes at {} bytes/chunk needs {}",
                total_chunks, total_size, chunk_size, expected.total_chunks
            )));
        }
        Ok(geometry)
    }

    /// Plaintext length of chunk `index`
    pub fn plaintext_len(&self, index: u32) -> u64 {
        debug_assert!(index < self.total_chunks);
        if index + 1 < self.total_chunks {
            u64::from(self.chunk_size)
        } else {
            self.total_size - u64::from(index) * u64::from(self.chunk_size)
        }
    }

    /// Ciphertext length of chunk `index` (plaintext plus authentication tag)
    pub fn ciphertext_len(&self, index: u32) -> u64 {
        self.plaintext_len(index) + u64::from(self.tag_size)
    }

    /// Total ciphertext length across all chunks
    pub fn total_ciphertext_len(&self) -> u64 {
        self.total_size + u64::from(self.total_chunks) * u64::from(self.tag_size)
    }
}

/// An encrypted chunk ready for transfer
#[derive(Debug, Clone)]
pub struct EncryptedChunk {
    /// Chunk index (0-based)
    pub index: u32,
    /// Encrypted chunk data including the authentication tag
    pub ciphertext: Bytes,
}

/// Summary produced when encoding finishes
#[derive(Debug, Clone)]
pub struct EncodeSummary {
    /// Number of chunks emitted
    pub total_chunks: u32,
    /// Total plaintext bytes processed
    pub total_size: u64,
    /// Hex SHA-256 of the plaintext
    pub content_sha256: String,
}

/// Streaming chunk encryptor.
///
/// Feed plaintext with `update`; complete chunks come back as soon as they
/// fill, so the caller can hand each one to the network immediately. Chunks
/// are produced in strict index order — the nonce derivation is index-pure,
/// but the plaintext split itself is sequential.
pub struct ChunkedEncoder {
    aead: Aead,
    base_iv: Nonce,
    aad: Vec<u8>,
    chunk_size: usize,
    next_index: u32,
    buf: Vec<u8>,
    hasher: Sha256,
    bytes_processed: u64,
}

impl ChunkedEncoder {
    /// Create an encoder for one object
    pub fn new(
        dek: &DekKey,
        cipher: AeadCipher,
        base_iv: Nonce,
        aad: Vec<u8>,
        chunk_size: usize,
    ) -> Self {
        let chunk_size = clamp_chunk_size(chunk_size);
        Self {
            aead: Aead::new(dek, cipher),
            base_iv,
            aad,
            chunk_size,
            next_index: 0,
            buf: Vec::with_capacity(chunk_size),
            hasher: Sha256::new(),
            bytes_processed: 0,
        }
    }

    /// Feed plaintext, returning any chunks that became complete
    pub fn update(&mut self, mut data: &[u8]) -> Result<Vec<EncryptedChunk>> {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;

        let mut ready = Vec::new();
        while !data.is_empty() {
            let want = self.chunk_size - self.buf.len();
            let take = want.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.chunk_size {
                ready.push(self.seal_buffered()?);
            }
        }
        Ok(ready)
    }

    /// Finish encoding, returning the final short chunk (if any) and the
    /// summary. An object that never produced a chunk emits one empty chunk
    /// so even zero-byte content carries an authentication tag.
    pub fn finalize(mut self) -> Result<(Option<EncryptedChunk>, EncodeSummary)> {
        let last = if !self.buf.is_empty() || self.next_index == 0 {
            Some(self.seal_buffered()?)
        } else {
            None
        };
        let summary = EncodeSummary {
            total_chunks: self.next_index,
            total_size: self.bytes_processed,
            content_sha256: hex::encode(self.hasher.finalize()),
        };
        Ok((last, summary))
    }

    fn seal_buffered(&mut self) -> Result<EncryptedChunk> {
        let index = self.next_index;
        let nonce = self.base_iv.for_chunk(index);
        let ciphertext = self.aead.encrypt_with_aad(&nonce, &self.buf, &self.aad)?;
        self.buf.clear();
        self.next_index += 1;
        Ok(EncryptedChunk {
            index,
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// Total plaintext bytes fed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Chunks emitted so far
    pub fn chunk_count(&self) -> u32 {
        self.next_index
    }
}

/// Streaming chunk decryptor.
///
/// Chunks must be fed in index order; each one's tag is verified before its
/// plaintext is returned, and the first failure poisons the decoder — no
/// plaintext is ever emitted past a bad chunk.
pub struct ChunkedDecoder {
    aead: Aead,
    base_iv: Nonce,
    aad: Vec<u8>,
    geometry: ChunkGeometry,
    next_index: u32,
    bytes_emitted: u64,
    hasher: Sha256,
    poisoned: bool,
}

impl ChunkedDecoder {
    /// Create a decoder for one object
    pub fn new(
        dek: &DekKey,
        cipher: AeadCipher,
        base_iv: Nonce,
        aad: Vec<u8>,
        geometry: ChunkGeometry,
    ) -> Self {
        Self {
            aead: Aead::new(dek, cipher),
            base_iv,
            aad,
            geometry,
            next_index: 0,
            bytes_emitted: 0,
            hasher: Sha256::new(),
            poisoned: false,
        }
    }

    /// Layout this decoder expects
    pub fn geometry(&self) -> &ChunkGeometry {
        &self.geometry
    }

    /// Ciphertext length of the next expected chunk, or `None` when all
    /// chunks have been consumed. Lets a caller split a raw byte stream on
    /// chunk boundaries without guessing.
    pub fn next_ciphertext_len(&self) -> Option<usize> {
        (self.next_index < self.geometry.total_chunks)
            .then(|| self.geometry.ciphertext_len(self.next_index) as usize)
    }

    /// Verify and decrypt the next chunk
    pub fn decrypt_chunk(&mut self, index: u32, ciphertext: &[u8]) -> Result<Bytes> {
        if self.poisoned {
            return Err(CryptoError::WrongKeyOrCorrupted);
        }
        if index != self.next_index {
            return Err(CryptoError::InvalidEnvelope(format!(
                "chunk {} out of order, expected {}",
                index, self.next_index
            )));
        }
        if index >= self.geometry.total_chunks {
            return Err(CryptoError::InvalidEnvelope(format!(
                "chunk {} beyond declared count {}",
                index, self.geometry.total_chunks
            )));
        }
        if ciphertext.len() as u64 != self.geometry.ciphertext_len(index) {
            self.poisoned = true;
            return Err(CryptoError::WrongKeyOrCorrupted);
        }

        let nonce = self.base_iv.for_chunk(index);
        let plaintext = match self.aead.decrypt_with_aad(&nonce, ciphertext, &self.aad) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                self.poisoned = true;
                return Err(e);
            }
        };

        self.hasher.update(&plaintext);
        self.bytes_emitted += plaintext.len() as u64;
        self.next_index += 1;
        Ok(Bytes::from(plaintext))
    }

    /// Finish decoding: all chunks must have arrived, the byte count must
    /// match the descriptor, and the plaintext digest (when the uploader
    /// recorded one) must agree.
    pub fn finalize(self, expected_sha256: Option<&str>) -> Result<()> {
        if self.poisoned {
            return Err(CryptoError::WrongKeyOrCorrupted);
        }
        if self.next_index != self.geometry.total_chunks {
            return Err(CryptoError::InvalidEnvelope(format!(
                "only {} of {} chunks decoded",
                self.next_index, self.geometry.total_chunks
            )));
        }
        if self.bytes_emitted != self.geometry.total_size {
            return Err(CryptoError::InvalidEnvelope(format!(
                "decoded {} bytes, descriptor declares {}",
                self.bytes_emitted, self.geometry.total_size
            )));
        }
        if let Some(expected) = expected_sha256 {
            let actual = hex::encode(self.hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(CryptoError::HashMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Plaintext bytes emitted so far
    pub fn bytes_emitted(&self) -> u64 {
        self.bytes_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_AAD: &[u8] = b"chunk-test-aad";

    fn encode_all(
        dek: &DekKey,
        base_iv: &Nonce,
        chunk_size: usize,
        plaintext: &[u8],
    ) -> (Vec<EncryptedChunk>, EncodeSummary) {
        let mut encoder = ChunkedEncoder::new(
            dek,
            AeadCipher::Aes256Gcm,
            base_iv.clone(),
            TEST_AAD.to_vec(),
            chunk_size,
        );
        let mut chunks = encoder.update(plaintext).unwrap();
        let (last, summary) = encoder.finalize().unwrap();
        chunks.extend(last);
        (chunks, summary)
    }

    fn decoder_for(
        dek: &DekKey,
        base_iv: &Nonce,
        chunk_size: usize,
        summary: &EncodeSummary,
    ) -> ChunkedDecoder {
        let geometry =
            ChunkGeometry::for_size(summary.total_size, chunk_size, AeadCipher::Aes256Gcm);
        ChunkedDecoder::new(
            dek,
            AeadCipher::Aes256Gcm,
            base_iv.clone(),
            TEST_AAD.to_vec(),
            geometry,
        )
    }

    #[test]
    fn test_multi_chunk_roundtrip() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let original = b"chunked encryption roundtrip ".repeat(8000); // > 3 chunks

        let (chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, &original);
        assert!(summary.total_chunks > 3);

        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);
        let mut recovered = Vec::new();
        for chunk in &chunks {
            recovered.extend_from_slice(&decoder.decrypt_chunk(chunk.index, &chunk.ciphertext).unwrap());
        }
        decoder.finalize(Some(&summary.content_sha256)).unwrap();
        assert_eq!(recovered, original);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();

        let (chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, b"");
        assert_eq!(chunks.len(), 1);
        assert_eq!(summary.total_chunks, 1);
        assert_eq!(summary.total_size, 0);
        // Even an empty chunk carries a tag
        assert_eq!(chunks[0].ciphertext.len(), 16);

        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);
        let plain = decoder.decrypt_chunk(0, &chunks[0].ciphertext).unwrap();
        assert!(plain.is_empty());
        decoder.finalize(Some(&summary.content_sha256)).unwrap();
    }

    #[test]
    fn test_corrupt_chunk_fails_there_and_poisons_rest() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let original = vec![0xabu8; MIN_CHUNK_SIZE * 3 + 17];

        let (mut chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, &original);
        assert_eq!(chunks.len(), 4);

        // Flip one bit in chunk 1
        let mut corrupted = chunks[1].ciphertext.to_vec();
        corrupted[10] ^= 0x01;
        chunks[1].ciphertext = Bytes::from(corrupted);

        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);

        // Chunk 0 decrypts fine (it may already have been consumed downstream)
        let plain0 = decoder.decrypt_chunk(0, &chunks[0].ciphertext).unwrap();
        assert_eq!(&plain0[..], &original[..MIN_CHUNK_SIZE]);

        // Chunk 1 fails, and nothing after it is ever emitted
        let err = decoder.decrypt_chunk(1, &chunks[1].ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
        let err = decoder.decrypt_chunk(2, &chunks[2].ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::WrongKeyOrCorrupted));
    }

    #[test]
    fn test_out_of_order_chunk_rejected() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let original = vec![1u8; MIN_CHUNK_SIZE * 2];

        let (chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, &original);
        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);

        let err = decoder.decrypt_chunk(1, &chunks[1].ciphertext).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_missing_chunks_detected_at_finalize() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let original = vec![2u8; MIN_CHUNK_SIZE + 5];

        let (chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, &original);
        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);
        decoder.decrypt_chunk(0, &chunks[0].ciphertext).unwrap();

        let err = decoder.finalize(None).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_digest_mismatch_detected() {
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();

        let (chunks, summary) = encode_all(&dek, &base_iv, MIN_CHUNK_SIZE, b"digest check");
        let mut decoder = decoder_for(&dek, &base_iv, MIN_CHUNK_SIZE, &summary);
        for chunk in &chunks {
            decoder.decrypt_chunk(chunk.index, &chunk.ciphertext).unwrap();
        }
        let err = decoder.finalize(Some(&"00".repeat(32))).unwrap_err();
        assert!(matches!(err, CryptoError::HashMismatch { .. }));
    }

    #[test]
    fn test_geometry_consistency() {
        let geometry = ChunkGeometry::for_size(1000, MIN_CHUNK_SIZE, AeadCipher::Aes256Gcm);
        assert_eq!(geometry.total_chunks, 1);
        assert_eq!(geometry.plaintext_len(0), 1000);
        assert_eq!(geometry.ciphertext_len(0), 1016);

        let geometry = ChunkGeometry::for_size(
            MIN_CHUNK_SIZE as u64 * 2 + 1,
            MIN_CHUNK_SIZE,
            AeadCipher::Aes256Gcm,
        );
        assert_eq!(geometry.total_chunks, 3);
        assert_eq!(geometry.plaintext_len(2), 1);
        assert_eq!(
            geometry.total_ciphertext_len(),
            MIN_CHUNK_SIZE as u64 * 2 + 1 + 3 * 16
        );
    }

    #[test]
    fn test_geometry_mismatch_is_tamper_signal() {
        let err = ChunkGeometry::from_parts(
            MIN_CHUNK_SIZE as u32,
            5, // wrong: 1000 bytes needs 1 chunk
            1000,
            AeadCipher::Aes256Gcm,
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope(_)));
    }
}
