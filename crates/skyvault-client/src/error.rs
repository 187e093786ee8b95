//! Client error types

use skyvault_crypto::CryptoError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure. Transient: the transfer step may be retried,
    /// but any retry that re-encrypts must regenerate its IVs.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A cryptographic operation failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The object is encrypted but the share link carried no fragment.
    /// Decryption must not be attempted; the full link is required.
    #[error("decryption key missing - use the complete share link")]
    ShareKeyMissing,

    /// No master key: the session was never unlocked or has been logged out
    #[error("not logged in: no master key available")]
    LoggedOut,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The operation was cancelled between chunks
    #[error("transfer cancelled")]
    Cancelled,

    /// OS secure-store access failed
    #[error("secure store error: {0}")]
    SecureStore(String),

    /// The backend's response was structurally unusable
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether retrying the transfer step makes sense. Only transport
    /// failures qualify; a failed authentication tag never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this is the wrong-password / tampered-data signal
    pub fn is_wrong_key(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::WrongKeyOrCorrupted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let api_500 = ClientError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(api_500.is_retryable());

        let api_404 = ClientError::Api {
            status: 404,
            message: "gone".to_string(),
        };
        assert!(!api_404.is_retryable());

        let crypto = ClientError::Crypto(CryptoError::WrongKeyOrCorrupted);
        assert!(!crypto.is_retryable());
        assert!(crypto.is_wrong_key());
    }
}
