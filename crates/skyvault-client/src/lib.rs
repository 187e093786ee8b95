//! # Skyvault Client SDK
//!
//! Client SDK for Skyvault cloud storage with end-to-end encryption.
//!
//! ## Features
//!
//! - **Session keys**: the master key is derived from the account password
//!   on device and lives only for the session, with optional OS-keystore
//!   escrow for silent re-derivation after restart
//! - **Envelope encryption**: every object gets its own DEK, wrapped under
//!   the master key; the backend stores only ciphertext and envelopes
//! - **Streaming transfers**: chunked encryption on upload, chunk-by-chunk
//!   verification on download
//! - **Share links**: key material travels in the URL fragment, which is
//!   never sent to the server
//!
//! ## Example
//!
//! ```rust,ignore
//! use skyvault_client::{Config, SkyvaultClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SkyvaultClient::new(
//!         Config::new("https://api.skyvault.example").with_token("jwt"),
//!     )?;
//!
//!     // Derivation runs in the background; transfers wait for the key
//!     client.init_session("acct-1", "correct-horse").await?;
//!
//!     let uploaded = client
//!         .upload("notes.txt", Some("text/plain"), b"hello".to_vec())
//!         .await?;
//!
//!     let object = client.download(&uploaded.file_id).await?;
//!     assert_eq!(object.data, b"hello");
//!
//!     // Recipients decrypt with the fragment alone - no account needed
//!     let link = client.create_share_link(&uploaded.file_id).await?;
//!
//!     Ok(())
//! }
//! ```

mod api;
mod config;
mod error;
mod session;
mod transfer;
mod types;

pub use api::{StorageApi, ENVELOPE_HEADER, VERSIONING_HEADER};
pub use config::{Config, VersioningPolicy};
pub use error::{ClientError, Result};
pub use session::{Escrow, EscrowRecord, KeyState, Session};
pub use transfer::{CancelHandle, PhaseCallback, SkyvaultClient, TransferOptions, TransferPhase};
pub use types::{
    DownloadedObject, KdfInitResponse, ProgressCallback, ShareCreated, TransferProgress,
    UploadResult,
};

// Re-export crypto types callers commonly need
pub use skyvault_crypto::{KdfAlgorithm, KdfParams, ObjectEnvelope, ShareSecret};
