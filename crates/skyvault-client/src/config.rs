//! Client configuration

use std::time::Duration;

/// What to do when uploading to a logical path that already has a file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersioningPolicy {
    /// Keep history: a new upload becomes a new version with a fresh DEK
    NewVersion,
    /// Replace in place (still re-encrypted under a fresh DEK)
    Overwrite,
}

impl Default for VersioningPolicy {
    fn default() -> Self {
        Self::NewVersion
    }
}

impl VersioningPolicy {
    /// Wire value sent with every upload
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Self::NewVersion => "new-version",
            Self::Overwrite => "overwrite",
        }
    }
}

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend endpoint URL
    pub endpoint: String,
    /// Access token (bearer)
    pub access_token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum retry attempts for transient transfer failures
    pub max_retries: u32,
    /// Plaintext bytes per encrypted chunk
    pub chunk_size: usize,
    /// What uploads do to existing logical paths
    pub versioning: VersioningPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4000".to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("skyvault-client/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
            chunk_size: skyvault_crypto::DEFAULT_CHUNK_SIZE,
            versioning: VersioningPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the chunk size (clamped to the supported range at use)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the versioning policy
    pub fn with_versioning(mut self, policy: VersioningPolicy) -> Self {
        self.versioning = policy;
        self
    }
}
