//! Wire and result types for the client SDK

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyvault_crypto::{KdfAlgorithm, KdfParams};

/// Response of `POST /crypto/init`: the account's key-derivation parameters.
///
/// Public but integrity-relevant - always fetched fresh for the current
/// account, never cached across accounts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfInitResponse {
    /// Per-account salt, base64
    pub kdf_salt: String,
    /// Iteration count
    pub kdf_iterations: u32,
    /// KDF algorithm; older backends omit it
    #[serde(default)]
    pub kdf_algorithm: KdfAlgorithm,
}

impl KdfInitResponse {
    /// Convert into validated KDF parameters
    pub fn into_params(self) -> Result<KdfParams, skyvault_crypto::CryptoError> {
        use base64::Engine;
        let salt = base64::engine::general_purpose::STANDARD
            .decode(&self.kdf_salt)
            .map_err(|e| {
                skyvault_crypto::CryptoError::InvalidKdfParams(format!("salt not base64: {e}"))
            })?;
        let mut params = KdfParams::new(salt, self.kdf_iterations)?;
        params.algorithm = self.kdf_algorithm;
        Ok(params)
    }
}

/// Result of an upload
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Opaque id of the stored object
    pub file_id: String,
    /// Version id when the path already existed and versioning kept history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Server-side creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response of the share endpoint: a server-issued path for the link.
/// Never contains key material - the fragment is appended client-side.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCreated {
    /// Path component of the share link, e.g. `/s/abc123`
    pub share_path: String,
}

/// A fully decrypted object
#[derive(Debug)]
pub struct DownloadedObject {
    /// Plaintext content
    pub data: Vec<u8>,
    /// Decrypted filename
    pub name: String,
    /// Decrypted MIME type, when one was stored
    pub mime: Option<String>,
}

/// Transfer progress information
#[derive(Clone, Debug)]
pub struct TransferProgress {
    /// Plaintext bytes processed so far
    pub bytes_done: u64,
    /// Total plaintext bytes
    pub bytes_total: u64,
    /// Chunks completed
    pub chunks_done: u32,
    /// Total chunks
    pub chunks_total: u32,
}

impl TransferProgress {
    /// Get percentage complete
    pub fn percentage(&self) -> f64 {
        if self.bytes_total == 0 {
            return 100.0;
        }
        (self.bytes_done as f64 / self.bytes_total as f64) * 100.0
    }
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_init_response_parses() {
        use base64::Engine;
        let salt = base64::engine::general_purpose::STANDARD.encode([7u8; 16]);
        let json = format!(r#"{{"kdfSalt":"{salt}","kdfIterations":600000}}"#);
        let resp: KdfInitResponse = serde_json::from_str(&json).unwrap();
        let params = resp.into_params().unwrap();
        assert_eq!(params.iterations, 600_000);
        assert_eq!(params.salt, vec![7u8; 16]);
    }

    #[test]
    fn test_kdf_init_response_rejects_garbage_salt() {
        let resp = KdfInitResponse {
            kdf_salt: "not base64 !!!".to_string(),
            kdf_iterations: 600_000,
            kdf_algorithm: KdfAlgorithm::default(),
        };
        assert!(resp.into_params().is_err());
    }

    #[test]
    fn test_progress_percentage() {
        let progress = TransferProgress {
            bytes_done: 512,
            bytes_total: 1024,
            chunks_done: 1,
            chunks_total: 2,
        };
        assert!((progress.percentage() - 50.0).abs() < f64::EPSILON);

        let empty = TransferProgress {
            bytes_done: 0,
            bytes_total: 0,
            chunks_done: 0,
            chunks_total: 0,
        };
        assert!((empty.percentage() - 100.0).abs() < f64::EPSILON);
    }
}
