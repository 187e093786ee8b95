//! HTTP transport for the storage backend
//!
//! The backend is a black box that stores ciphertext and envelopes addressed
//! by opaque ids. Envelopes ride in a JSON request/response header next to
//! the raw ciphertext body, so content bytes stream without multipart
//! framing. Nothing in this module ever sees plaintext or unwrapped keys.

use crate::{
    types::{KdfInitResponse, ShareCreated, UploadResult},
    ClientError, Config, Result,
};
use reqwest::{header, Body, Client, Response};
use skyvault_crypto::ObjectEnvelope;
use tracing::{debug, instrument};

/// Request/response header carrying the envelope JSON
pub const ENVELOPE_HEADER: &str = "x-sv-envelope";

/// Request header telling the server what to do with an existing path
pub const VERSIONING_HEADER: &str = "x-sv-versioning";

/// Low-level storage API wrapper
pub struct StorageApi {
    config: Config,
    http: Client,
}

impl StorageApi {
    /// Create a new API wrapper with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| ClientError::Config("invalid user agent".to_string()))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Network)?;

        Ok(Self { config, http })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch the account's key-derivation parameters
    #[instrument(skip(self))]
    pub async fn crypto_init(&self) -> Result<KdfInitResponse> {
        let response = self.post("/crypto/init").send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Upload one encrypted object: envelope in the header, ciphertext as the
    /// (possibly streaming) body. Returns the server-assigned file id.
    #[instrument(skip(self, envelope, body))]
    pub async fn upload(&self, envelope: &ObjectEnvelope, body: Body) -> Result<UploadResult> {
        let envelope_json = serde_json::to_string(envelope)
            .map_err(|e| ClientError::Config(format!("envelope serialization: {e}")))?;

        debug!(size_bytes = envelope.size_bytes, "uploading object");
        let response = self
            .post("/files")
            .header(ENVELOPE_HEADER, envelope_json)
            .header(VERSIONING_HEADER, self.config.versioning.as_header_value())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch only the envelope of a stored object
    #[instrument(skip(self))]
    pub async fn fetch_envelope(&self, file_id: &str) -> Result<ObjectEnvelope> {
        let response = self.get(&format!("/files/{file_id}/envelope")).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    /// Start downloading an object by id. Returns the envelope (from the
    /// response header) and the response whose body is the ciphertext stream.
    #[instrument(skip(self))]
    pub async fn download(&self, file_id: &str) -> Result<(ObjectEnvelope, Response)> {
        let response = self.get(&format!("/files/{file_id}")).send().await?;
        self.open_download(response).await
    }

    /// Start downloading through a share token path (recipient side)
    #[instrument(skip(self))]
    pub async fn download_shared(&self, share_token: &str) -> Result<(ObjectEnvelope, Response)> {
        let response = self.get(&format!("/s/{share_token}")).send().await?;
        self.open_download(response).await
    }

    /// Ask the server for a share path for an object. The response never
    /// contains key material; the DEK-bearing fragment is appended locally
    /// by the caller.
    #[instrument(skip(self))]
    pub async fn create_share(&self, file_id: &str) -> Result<ShareCreated> {
        let response = self.post(&format!("/files/{file_id}/share")).send().await?;
        let response = Self::check(response).await?;
        Ok(response.json().await?)
    }

    async fn open_download(&self, response: Response) -> Result<(ObjectEnvelope, Response)> {
        let response = Self::check(response).await?;
        let envelope_json = response
            .headers()
            .get(ENVELOPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("missing {ENVELOPE_HEADER} header"))
            })?;
        let envelope: ObjectEnvelope = serde_json::from_str(envelope_json)
            .map_err(|e| ClientError::InvalidResponse(format!("bad envelope header: {e}")))?;
        Ok((envelope, response))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.http.post(self.url(path)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => req.header(header::AUTHORIZATION, format!("Bearer {token}")),
            None => req,
        }
    }

    /// Map non-success statuses to `Api` errors with the server's message
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = match response.text().await {
            Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("error")?.as_str().map(str::to_string))
                .unwrap_or(text),
            Err(_) => String::new(),
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
