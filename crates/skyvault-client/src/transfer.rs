//! Upload/download orchestration
//!
//! Ties the session, the crypto core and the transport together. Uploads
//! encrypt chunk by chunk and hand each encrypted chunk to the request body
//! as it is produced; downloads decrypt chunks as the response bytes arrive
//! and abort on the first failed tag without emitting anything further.
//! Transfers may be cancelled between chunks; the per-operation DEK dies
//! with the operation (zeroize on drop) while the session key persists.

use crate::{
    api::StorageApi,
    session::Session,
    types::{DownloadedObject, TransferProgress, UploadResult},
    ClientError, Config, Result,
};
use bytes::Bytes;
use futures::StreamExt;
use skyvault_crypto::{
    clamp_chunk_size,
    envelope::{decrypt_mime, decrypt_name, encrypt_mime, encrypt_name},
    sha256_hex, unwrap_dek, wrap_dek, AeadCipher, ChunkGeometry, ChunkedDecoder, ChunkedEncoder,
    CryptoError, DekKey, EncMeta, MasterKey, Nonce, ObjectEnvelope, ShareSecret,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument, warn};
use url::Url;

/// Where a transfer currently is. `Failed` is reachable from every other
/// phase; `Complete` only after the server acknowledged the full object
/// (upload) or the last chunk verified (download).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferPhase {
    DerivingKey,
    Encrypting,
    Transferring,
    Decrypting,
    Complete,
    Failed,
}

/// Phase observer callback
pub type PhaseCallback = Box<dyn Fn(TransferPhase) + Send + Sync>;

/// Cooperative cancellation flag, checked between chunks
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next chunk boundary
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-transfer options
#[derive(Default)]
pub struct TransferOptions {
    /// Progress callback, invoked once per completed chunk
    pub progress: Option<crate::types::ProgressCallback>,
    /// Phase observer
    pub phase: Option<PhaseCallback>,
    /// Cancellation handle
    pub cancel: Option<CancelHandle>,
}

impl TransferOptions {
    fn emit_phase(&self, phase: TransferPhase) {
        if let Some(cb) = &self.phase {
            cb(phase);
        }
    }

    fn emit_progress(&self, progress: TransferProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }

    fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone().unwrap_or_default()
    }
}

/// The encrypted storage client: session keys plus transfer orchestration
pub struct SkyvaultClient {
    api: StorageApi,
    session: Session,
}

impl SkyvaultClient {
    /// Create a client with a fresh (locked) session
    pub fn new(config: Config) -> Result<Self> {
        Self::with_session(config, Session::new())
    }

    /// Create a client around an existing session context
    pub fn with_session(config: Config, session: Session) -> Result<Self> {
        Ok(Self {
            api: StorageApi::new(config)?,
            session,
        })
    }

    /// The session context
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The low-level transport
    pub fn api(&self) -> &StorageApi {
        &self.api
    }

    /// Fetch this account's KDF parameters and start deriving the master
    /// key in the background. Returns once derivation is scheduled; awaiting
    /// the returned handle (or any later transfer) waits for the key itself.
    pub async fn init_session(
        &self,
        account_id: &str,
        password: &str,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let params = self.api.crypto_init().await?.into_params()?;
        self.session.login(account_id, password, params)
    }

    /// Upload an in-memory object
    pub async fn upload(
        &self,
        name: &str,
        mime: Option<&str>,
        data: Vec<u8>,
    ) -> Result<UploadResult> {
        self.upload_with(name, mime, data, TransferOptions::default())
            .await
    }

    /// Upload an in-memory object with progress/cancellation options.
    ///
    /// Content is encrypted chunk by chunk and streamed; nothing buffers the
    /// full ciphertext. Transient network failures are retried with a fresh
    /// DEK and fresh IVs each attempt — an IV consumed by a failed attempt
    /// is never reused.
    #[instrument(skip(self, data, options), fields(size = data.len()))]
    pub async fn upload_with(
        &self,
        name: &str,
        mime: Option<&str>,
        data: Vec<u8>,
        options: TransferOptions,
    ) -> Result<UploadResult> {
        let cancel = options.cancel_handle();
        if !self.session.is_ready() {
            options.emit_phase(TransferPhase::DerivingKey);
        }
        let mk = self.session.master_key().await?;

        // Guess the MIME type from the filename when the caller has none
        let mime = mime.map(str::to_string).or_else(|| {
            mime_guess::from_path(name)
                .first_raw()
                .map(str::to_string)
        });

        let content_sha256 = sha256_hex(&data);
        let data = Arc::new(data);
        let options = Arc::new(options);

        let mut attempt = 0u32;
        loop {
            options.emit_phase(TransferPhase::Encrypting);
            let result = self
                .upload_attempt(
                    name,
                    mime.as_deref(),
                    &mk,
                    Arc::clone(&data),
                    &content_sha256,
                    &cancel,
                    Arc::clone(&options),
                )
                .await;

            match result {
                Ok(result) => {
                    options.emit_phase(TransferPhase::Complete);
                    return Ok(result);
                }
                Err(_) if cancel.is_cancelled() => {
                    options.emit_phase(TransferPhase::Failed);
                    return Err(ClientError::Cancelled);
                }
                Err(e) if e.is_retryable() && attempt < self.api.config().max_retries => {
                    attempt += 1;
                    warn!(attempt, "upload failed, retrying with fresh keys: {e}");
                }
                Err(e) => {
                    options.emit_phase(TransferPhase::Failed);
                    return Err(e);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_attempt(
        &self,
        name: &str,
        mime: Option<&str>,
        mk: &MasterKey,
        data: Arc<Vec<u8>>,
        content_sha256: &str,
        cancel: &CancelHandle,
        options: Arc<TransferOptions>,
    ) -> Result<UploadResult> {
        let cipher = AeadCipher::default();
        let chunk_size = clamp_chunk_size(self.api.config().chunk_size);

        // Fresh DEK and IVs for every attempt
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let geometry = ChunkGeometry::for_size(data.len() as u64, chunk_size, cipher);
        let enc_meta = EncMeta::new(cipher, &geometry, base_iv.clone());

        let (meta_name_enc, meta_name_iv) = encrypt_name(name, &dek, cipher)?;
        let (mime_enc, mime_iv) = match mime {
            Some(mime) => {
                let (enc, iv) = encrypt_mime(mime, &dek, cipher)?;
                (Some(enc), Some(iv))
            }
            None => (None, None),
        };
        let (edek, edek_iv) = wrap_dek(&dek, mk)?;

        let envelope = ObjectEnvelope {
            cipher_iv: base_iv.clone(),
            edek,
            edek_iv,
            enc_meta: enc_meta.clone(),
            meta_name_enc,
            meta_name_iv,
            mime_enc,
            mime_iv,
            content_sha256: Some(content_sha256.to_string()),
            size_bytes: data.len() as u64,
        };

        // Each pull on the body encrypts exactly one chunk, so ciphertext
        // leaves for the network as it is produced and the loop yields
        // between chunks.
        let encoder = ChunkedEncoder::new(&dek, cipher, base_iv, enc_meta.aad_bytes(), chunk_size);
        let body = reqwest::Body::wrap_stream(encrypt_body_stream(
            encoder,
            data,
            chunk_size,
            geometry,
            cancel.clone(),
            options,
        ));

        self.api.upload(&envelope, body).await
    }

    /// Upload from an async byte source without buffering the plaintext.
    ///
    /// One-pass: the plaintext digest is omitted (computing it would need a
    /// second read of the source), and a transport failure is surfaced
    /// rather than retried — the caller re-opens the source to try again,
    /// and the re-encryption gets fresh IVs like any other attempt.
    pub async fn upload_stream<R>(
        &self,
        name: &str,
        mime: Option<&str>,
        reader: R,
        size_bytes: u64,
    ) -> Result<UploadResult>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.upload_stream_with(name, mime, reader, size_bytes, TransferOptions::default())
            .await
    }

    /// Streaming upload with progress/cancellation options
    #[instrument(skip(self, reader, options))]
    pub async fn upload_stream_with<R>(
        &self,
        name: &str,
        mime: Option<&str>,
        reader: R,
        size_bytes: u64,
        options: TransferOptions,
    ) -> Result<UploadResult>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = options.cancel_handle();
        if !self.session.is_ready() {
            options.emit_phase(TransferPhase::DerivingKey);
        }
        let mk = self.session.master_key().await?;

        let mime = mime.map(str::to_string).or_else(|| {
            mime_guess::from_path(name)
                .first_raw()
                .map(str::to_string)
        });

        let cipher = AeadCipher::default();
        let chunk_size = clamp_chunk_size(self.api.config().chunk_size);
        let dek = DekKey::generate();
        let base_iv = Nonce::generate();
        let geometry = ChunkGeometry::for_size(size_bytes, chunk_size, cipher);
        let enc_meta = EncMeta::new(cipher, &geometry, base_iv.clone());

        let (meta_name_enc, meta_name_iv) = encrypt_name(name, &dek, cipher)?;
        let (mime_enc, mime_iv) = match mime.as_deref() {
            Some(mime) => {
                let (enc, iv) = encrypt_mime(mime, &dek, cipher)?;
                (Some(enc), Some(iv))
            }
            None => (None, None),
        };
        let (edek, edek_iv) = wrap_dek(&dek, &mk)?;

        let envelope = ObjectEnvelope {
            cipher_iv: base_iv.clone(),
            edek,
            edek_iv,
            enc_meta: enc_meta.clone(),
            meta_name_enc,
            meta_name_iv,
            mime_enc,
            mime_iv,
            content_sha256: None,
            size_bytes,
        };

        options.emit_phase(TransferPhase::Encrypting);
        let encoder = ChunkedEncoder::new(&dek, cipher, base_iv, enc_meta.aad_bytes(), chunk_size);
        let options = Arc::new(options);
        let body = reqwest::Body::wrap_stream(encrypt_reader_stream(
            encoder,
            reader,
            chunk_size,
            size_bytes,
            geometry,
            cancel.clone(),
            Arc::clone(&options),
        ));

        match self.api.upload(&envelope, body).await {
            Ok(result) => {
                options.emit_phase(TransferPhase::Complete);
                Ok(result)
            }
            Err(_) if cancel.is_cancelled() => {
                options.emit_phase(TransferPhase::Failed);
                Err(ClientError::Cancelled)
            }
            Err(e) => {
                options.emit_phase(TransferPhase::Failed);
                Err(e)
            }
        }
    }

    /// Download and decrypt an object the session owns
    pub async fn download(&self, file_id: &str) -> Result<DownloadedObject> {
        self.download_with(file_id, TransferOptions::default()).await
    }

    /// Download with progress/cancellation options
    #[instrument(skip(self, options))]
    pub async fn download_with(
        &self,
        file_id: &str,
        options: TransferOptions,
    ) -> Result<DownloadedObject> {
        let cancel = options.cancel_handle();
        if !self.session.is_ready() {
            options.emit_phase(TransferPhase::DerivingKey);
        }
        let mk = self.session.master_key().await?;

        let mut attempt = 0u32;
        loop {
            options.emit_phase(TransferPhase::Transferring);
            let result = self.download_attempt(file_id, &mk, &cancel, &options).await;
            match result {
                Ok(object) => {
                    options.emit_phase(TransferPhase::Complete);
                    return Ok(object);
                }
                Err(_) if cancel.is_cancelled() => {
                    options.emit_phase(TransferPhase::Failed);
                    return Err(ClientError::Cancelled);
                }
                Err(e) if e.is_retryable() && attempt < self.api.config().max_retries => {
                    attempt += 1;
                    warn!(attempt, "download failed, retrying: {e}");
                }
                Err(e) => {
                    options.emit_phase(TransferPhase::Failed);
                    return Err(e);
                }
            }
        }
    }

    async fn download_attempt(
        &self,
        file_id: &str,
        mk: &MasterKey,
        cancel: &CancelHandle,
        options: &TransferOptions,
    ) -> Result<DownloadedObject> {
        let (envelope, response) = self.api.download(file_id).await?;
        let dek = unwrap_dek(&envelope.edek, &envelope.edek_iv, mk)?;
        let cipher = envelope.enc_meta.algorithm();

        options.emit_phase(TransferPhase::Decrypting);
        let base_iv = envelope.enc_meta.base_iv().clone();
        let data = decrypt_body(&envelope, response, &dek, base_iv, cancel, options).await?;

        let name = decrypt_name(&envelope.meta_name_enc, &envelope.meta_name_iv, &dek, cipher)?;
        let mime = decrypt_envelope_mime(&envelope, &dek)?;
        Ok(DownloadedObject { data, name, mime })
    }

    /// Download an object through its full share link, decrypting with the
    /// DEK recovered from the fragment. The owner's master key is never
    /// involved — this is the whole point of fragment-based sharing.
    ///
    /// A link without a fragment is rejected before any network activity:
    /// fetching ciphertext that cannot be decrypted only produces an opaque
    /// failure later.
    pub async fn download_shared(&self, link: &str) -> Result<DownloadedObject> {
        self.download_shared_with(link, TransferOptions::default())
            .await
    }

    /// Shared download with progress/cancellation options
    #[instrument(skip(self, link, options))]
    pub async fn download_shared_with(
        &self,
        link: &str,
        options: TransferOptions,
    ) -> Result<DownloadedObject> {
        let (base, fragment) = skyvault_crypto::split_fragment(link);
        let Some(fragment) = fragment else {
            return Err(ClientError::ShareKeyMissing);
        };
        let secret = ShareSecret::import(fragment)?;
        let token = share_token(base)?;
        let cancel = options.cancel_handle();

        options.emit_phase(TransferPhase::Transferring);
        let result = async {
            let (envelope, response) = self.api.download_shared(&token).await?;
            let cipher = envelope.enc_meta.algorithm();

            options.emit_phase(TransferPhase::Decrypting);
            let data = decrypt_body(
                &envelope,
                response,
                &secret.dek,
                secret.cipher_iv.clone(),
                &cancel,
                &options,
            )
            .await?;

            // The filename comes from the fragment, not the server's copy
            let name = decrypt_name(&secret.meta_name_enc, &secret.meta_name_iv, &secret.dek, cipher)?;
            let mime = decrypt_envelope_mime(&envelope, &secret.dek)?;
            Ok(DownloadedObject { data, name, mime })
        }
        .await;

        match result {
            Ok(object) => {
                options.emit_phase(TransferPhase::Complete);
                Ok(object)
            }
            Err(_) if cancel.is_cancelled() => {
                options.emit_phase(TransferPhase::Failed);
                Err(ClientError::Cancelled)
            }
            Err(e) => {
                options.emit_phase(TransferPhase::Failed);
                Err(e)
            }
        }
    }

    /// Create a full share link for an object: server-issued path plus the
    /// locally-built key fragment after `#`.
    ///
    /// The fragment is assembled after the share request returns and is
    /// never attached to any outgoing request — the server only ever sees
    /// the file id.
    #[instrument(skip(self))]
    pub async fn create_share_link(&self, file_id: &str) -> Result<String> {
        let mk = self.session.master_key().await?;
        let envelope = self.api.fetch_envelope(file_id).await?;
        let dek = unwrap_dek(&envelope.edek, &envelope.edek_iv, &mk)?;

        let secret = ShareSecret {
            dek,
            cipher_iv: envelope.enc_meta.base_iv().clone(),
            meta_name_enc: envelope.meta_name_enc.clone(),
            meta_name_iv: envelope.meta_name_iv.clone(),
        };

        let share = self.api.create_share(file_id).await?;
        let url = format!(
            "{}{}",
            self.api.config().endpoint.trim_end_matches('/'),
            share.share_path
        );
        debug!(file_id, "share link created");
        Ok(skyvault_crypto::append_fragment(&url, &secret.export()))
    }
}

/// Lazily encrypting request-body stream: one chunk per pull
fn encrypt_body_stream(
    encoder: ChunkedEncoder,
    data: Arc<Vec<u8>>,
    chunk_size: usize,
    geometry: ChunkGeometry,
    cancel: CancelHandle,
    options: Arc<TransferOptions>,
) -> impl futures::Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    struct State {
        encoder: Option<ChunkedEncoder>,
        data: Arc<Vec<u8>>,
        offset: usize,
        chunk_size: usize,
        geometry: ChunkGeometry,
        cancel: CancelHandle,
        options: Arc<TransferOptions>,
    }

    let state = State {
        encoder: Some(encoder),
        data,
        offset: 0,
        chunk_size,
        geometry,
        cancel,
        options,
    };

    futures::stream::unfold(state, |mut st| async move {
        let mut encoder = st.encoder.take()?;
        if st.cancel.is_cancelled() {
            // Abort the request; the server never acknowledges the object
            return Some((
                Err(std::io::Error::other("transfer cancelled")),
                st,
            ));
        }

        loop {
            if st.offset < st.data.len() {
                let end = (st.offset + st.chunk_size).min(st.data.len());
                let produced = match encoder.update(&st.data[st.offset..end]) {
                    Ok(chunks) => chunks,
                    Err(e) => return Some((Err(std::io::Error::other(e)), st)),
                };
                st.offset = end;
                if let Some(chunk) = produced.into_iter().next() {
                    emit_chunk_progress(&st.options, &st.geometry, chunk.index, encoder.bytes_processed().min(st.offset as u64));
                    st.encoder = Some(encoder);
                    return Some((Ok(chunk.ciphertext), st));
                }
                // Tail buffered but not yet a full chunk; keep feeding
            } else {
                // Input exhausted: flush the final (possibly empty) chunk
                let (last, _summary) = match encoder.finalize() {
                    Ok(result) => result,
                    Err(e) => return Some((Err(std::io::Error::other(e)), st)),
                };
                return last.map(|chunk| {
                    emit_chunk_progress(
                        &st.options,
                        &st.geometry,
                        chunk.index,
                        st.data.len() as u64,
                    );
                    (Ok(chunk.ciphertext), st)
                });
            }
        }
    })
}

/// Lazily encrypting body stream over an async byte source
fn encrypt_reader_stream<R>(
    encoder: ChunkedEncoder,
    reader: R,
    chunk_size: usize,
    size_bytes: u64,
    geometry: ChunkGeometry,
    cancel: CancelHandle,
    options: Arc<TransferOptions>,
) -> impl futures::Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    struct State<R> {
        encoder: Option<ChunkedEncoder>,
        reader: R,
        chunk_size: usize,
        size_bytes: u64,
        read_total: u64,
        geometry: ChunkGeometry,
        cancel: CancelHandle,
        options: Arc<TransferOptions>,
    }

    let state = State {
        encoder: Some(encoder),
        reader,
        chunk_size,
        size_bytes,
        read_total: 0,
        geometry,
        cancel,
        options,
    };

    futures::stream::unfold(state, |mut st| async move {
        let mut encoder = st.encoder.take()?;
        if st.cancel.is_cancelled() {
            return Some((
                Err(std::io::Error::other("transfer cancelled")),
                st,
            ));
        }

        let mut buffer = vec![0u8; st.chunk_size];
        loop {
            let mut filled = 0usize;
            while filled < st.chunk_size {
                match st.reader.read(&mut buffer[filled..]).await {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) => return Some((Err(e), st)),
                }
            }
            st.read_total += filled as u64;

            // The envelope already declared the size; a source that
            // disagrees aborts the request before the server can ack it
            if st.read_total > st.size_bytes {
                return Some((
                    Err(std::io::Error::other("source longer than declared size")),
                    st,
                ));
            }
            if filled == 0 {
                if st.read_total != st.size_bytes {
                    return Some((
                        Err(std::io::Error::other("source shorter than declared size")),
                        st,
                    ));
                }
                let (last, _summary) = match encoder.finalize() {
                    Ok(result) => result,
                    Err(e) => return Some((Err(std::io::Error::other(e)), st)),
                };
                return last.map(|chunk| {
                    emit_chunk_progress(&st.options, &st.geometry, chunk.index, st.read_total);
                    (Ok(chunk.ciphertext), st)
                });
            }

            let produced = match encoder.update(&buffer[..filled]) {
                Ok(chunks) => chunks,
                Err(e) => return Some((Err(std::io::Error::other(e)), st)),
            };
            if let Some(chunk) = produced.into_iter().next() {
                emit_chunk_progress(&st.options, &st.geometry, chunk.index, st.read_total);
                st.encoder = Some(encoder);
                return Some((Ok(chunk.ciphertext), st));
            }
            // Short read at EOF boundary: the next read returns 0 and the
            // finalize path flushes the buffered tail
        }
    })
}

fn emit_chunk_progress(
    options: &TransferOptions,
    geometry: &ChunkGeometry,
    chunk_index: u32,
    bytes_done: u64,
) {
    options.emit_progress(TransferProgress {
        bytes_done,
        bytes_total: geometry.total_size,
        chunks_done: chunk_index + 1,
        chunks_total: geometry.total_chunks,
    });
}

/// Decrypt a ciphertext response body chunk by chunk.
///
/// Chunks are verified as their bytes arrive; the first failed tag aborts
/// immediately — chunks before it may already have been emitted, nothing
/// after it ever is.
async fn decrypt_body(
    envelope: &ObjectEnvelope,
    response: reqwest::Response,
    dek: &DekKey,
    base_iv: Nonce,
    cancel: &CancelHandle,
    options: &TransferOptions,
) -> Result<Vec<u8>> {
    let cipher = envelope.enc_meta.algorithm();
    let geometry = envelope.enc_meta.geometry(envelope.size_bytes)?;
    let mut decoder = ChunkedDecoder::new(
        dek,
        cipher,
        base_iv,
        envelope.enc_meta.aad_bytes(),
        geometry,
    );

    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    let mut out = Vec::with_capacity(envelope.size_bytes as usize);
    let mut index = 0u32;

    while let Some(need) = decoder.next_ciphertext_len() {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        while buf.len() < need {
            match stream.next().await {
                Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(ClientError::Network(e)),
                None => {
                    return Err(ClientError::InvalidResponse(
                        "ciphertext ended mid-chunk".to_string(),
                    ))
                }
            }
        }
        let chunk: Vec<u8> = buf.drain(..need).collect();
        out.extend_from_slice(&decoder.decrypt_chunk(index, &chunk)?);
        index += 1;

        emit_chunk_progress(options, &geometry, index - 1, out.len() as u64);
    }

    // Anything past the declared geometry is a server-side inconsistency
    if !buf.is_empty() {
        return Err(ClientError::InvalidResponse(
            "trailing bytes after final chunk".to_string(),
        ));
    }
    while let Some(extra) = stream.next().await {
        match extra {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(_) => {
                return Err(ClientError::InvalidResponse(
                    "trailing bytes after final chunk".to_string(),
                ))
            }
            Err(e) => return Err(ClientError::Network(e)),
        }
    }

    decoder.finalize(envelope.content_sha256.as_deref())?;
    Ok(out)
}

fn decrypt_envelope_mime(envelope: &ObjectEnvelope, dek: &DekKey) -> Result<Option<String>> {
    let cipher = envelope.enc_meta.algorithm();
    match (&envelope.mime_enc, &envelope.mime_iv) {
        (Some(enc), Some(iv)) => Ok(Some(decrypt_mime(enc, iv, dek, cipher)?)),
        (None, None) => Ok(None),
        _ => Err(ClientError::InvalidResponse(
            "mimeEnc and mimeIv must be present together".to_string(),
        )),
    }
}

/// Extract the share token from the server-visible part of a share link
fn share_token(base: &str) -> Result<String> {
    if let Ok(url) = Url::parse(base) {
        if let Some(segment) = url.path_segments().and_then(|mut s| s.next_back()) {
            if !segment.is_empty() {
                return Ok(segment.to_string());
            }
        }
        Err(ClientError::Crypto(CryptoError::MalformedShareLink(
            "share link has no token path".to_string(),
        )))
    } else {
        // A bare token or relative path is fine too
        let token = base.trim_matches('/').rsplit('/').next().unwrap_or(base);
        if token.is_empty() {
            return Err(ClientError::Crypto(CryptoError::MalformedShareLink(
                "empty share token".to_string(),
            )));
        }
        Ok(token.to_string())
    }
}
