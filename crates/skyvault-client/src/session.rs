//! Session-scoped master-key context
//!
//! The master key is shared state for the whole authenticated session:
//! readable by any concurrent transfer, set only by login (or silent restore
//! from escrow), cleared only by logout. Holding it behind an explicit
//! context object rather than a global makes the logout barrier enforceable:
//! once clearing starts, no new encrypt/decrypt can obtain the key, while
//! operations already holding a clone run to completion with it.
//!
//! Key derivation is a long synchronous CPU-bound call, so login runs it on
//! a blocking thread and exposes readiness as a state later operations
//! await, instead of a fire-and-forget task with timing assumptions.

use crate::{ClientError, Result};
use serde::{Deserialize, Serialize};
use skyvault_crypto::{derive_master_key, KdfParams, MasterKey};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::{debug, warn};
use zeroize::Zeroize;

/// Lifecycle of the session key
#[derive(Clone, Debug)]
pub enum KeyState {
    /// No key: never logged in, or logged out
    LoggedOut,
    /// Login started; derivation is running on a blocking thread
    Deriving,
    /// The master key is available
    Ready(MasterKey),
}

struct SessionInner {
    state: watch::Sender<KeyState>,
    // Incremented by every login/logout so a stale derivation can never
    // resurrect a key after logout
    epoch: AtomicU64,
    escrow: Option<Escrow>,
}

/// The session context passed to every call site that encrypts or decrypts
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a locked session with no escrow
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a locked session that escrows credentials in the OS keystore
    /// for silent re-derivation after restart
    pub fn with_escrow(escrow: Escrow) -> Self {
        Self::build(Some(escrow))
    }

    fn build(escrow: Option<Escrow>) -> Self {
        let (state, _) = watch::channel(KeyState::LoggedOut);
        Self {
            inner: Arc::new(SessionInner {
                state,
                epoch: AtomicU64::new(0),
                escrow,
            }),
        }
    }

    /// Start deriving the master key from the password and server-issued
    /// parameters. Returns immediately; the returned handle resolves when
    /// derivation finishes, and `master_key()` waits for the same moment.
    ///
    /// Parameters are validated up front: malformed KDF input is an
    /// initialization failure, not a later "wrong password" mystery.
    pub fn login(
        &self,
        account_id: &str,
        password: &str,
        params: KdfParams,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        params.validate().map_err(ClientError::Crypto)?;

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(KeyState::Deriving);

        let inner = Arc::clone(&self.inner);
        let escrow = self.inner.escrow.clone();
        let account_id = account_id.to_string();
        let mut password = password.to_string();
        Ok(tokio::spawn(async move {
            // KDF plus keystore access both block; keep them off the executor
            let derived = tokio::task::spawn_blocking(move || {
                let result = derive_master_key(&password, &params);
                if let (Ok(_), Some(escrow)) = (&result, &escrow) {
                    // Best-effort: a failed keystore write only costs an
                    // interactive re-login after the next restart
                    if let Err(e) = escrow.store(&account_id, &password, &params) {
                        warn!("escrow store failed: {e}");
                    }
                }
                password.zeroize();
                result
            })
            .await
            .map_err(|e| ClientError::Config(format!("derivation task failed: {e}")))?;

            let mk = match derived {
                Ok(mk) => mk,
                Err(e) => {
                    inner.state.send_if_modified(|state| {
                        if inner.epoch.load(Ordering::SeqCst) == epoch {
                            *state = KeyState::LoggedOut;
                            true
                        } else {
                            false
                        }
                    });
                    return Err(ClientError::Crypto(e));
                }
            };

            let installed = inner.state.send_if_modified(|state| {
                if inner.epoch.load(Ordering::SeqCst) == epoch
                    && matches!(state, KeyState::Deriving)
                {
                    *state = KeyState::Ready(mk.clone());
                    true
                } else {
                    false
                }
            });
            if installed {
                debug!("master key ready");
                Ok(())
            } else {
                // Logged out while deriving; the key is dropped (and zeroized)
                Err(ClientError::LoggedOut)
            }
        }))
    }

    /// Silently restore the session from escrowed credentials, if any.
    /// Returns `Ok(false)` when no escrow entry exists; the session stays
    /// logged out until the next interactive login.
    pub async fn restore(&self, account_id: &str) -> Result<bool> {
        let Some(escrow) = &self.inner.escrow else {
            return Ok(false);
        };
        let escrow = escrow.clone();
        let account = account_id.to_string();
        let record = tokio::task::spawn_blocking(move || escrow.load(&account))
            .await
            .map_err(|e| ClientError::SecureStore(e.to_string()))??;

        let Some(record) = record else {
            return Ok(false);
        };
        let params = record.params()?;
        let handle = self.login(account_id, &record.password, params)?;
        handle
            .await
            .map_err(|e| ClientError::Config(format!("derivation task failed: {e}")))??;
        Ok(true)
    }

    /// Wait for the master key. Resolves as soon as a running derivation
    /// finishes; fails with `LoggedOut` when there is no session.
    pub async fn master_key(&self) -> Result<MasterKey> {
        let mut rx = self.inner.state.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                match &*state {
                    KeyState::Ready(mk) => return Ok(mk.clone()),
                    KeyState::LoggedOut => return Err(ClientError::LoggedOut),
                    KeyState::Deriving => {}
                }
            }
            rx.changed().await.map_err(|_| ClientError::LoggedOut)?;
        }
    }

    /// Whether a master key is currently available without waiting
    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.state.borrow(), KeyState::Ready(_))
    }

    /// Whether a derivation is in flight
    pub fn is_deriving(&self) -> bool {
        matches!(&*self.inner.state.borrow(), KeyState::Deriving)
    }

    /// Clear the session. This is a barrier: operations that have not yet
    /// obtained the key will fail from this point on; the escrow entry is
    /// deleted so the next restart cannot silently re-derive.
    pub async fn logout(&self, account_id: &str) -> Result<()> {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(KeyState::LoggedOut);

        if let Some(escrow) = &self.inner.escrow {
            let escrow = escrow.clone();
            let account = account_id.to_string();
            tokio::task::spawn_blocking(move || escrow.clear(&account))
                .await
                .map_err(|e| ClientError::SecureStore(e.to_string()))??;
        }
        debug!("session cleared");
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// What the OS keystore holds for silent re-derivation
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    pub password: String,
    /// Base64 salt
    pub kdf_salt: String,
    pub kdf_iterations: u32,
}

impl EscrowRecord {
    /// Rebuild validated KDF parameters from the stored fields
    pub fn params(&self) -> Result<KdfParams> {
        use base64::Engine;
        let salt = base64::engine::general_purpose::STANDARD
            .decode(&self.kdf_salt)
            .map_err(|e| {
                ClientError::Crypto(skyvault_crypto::CryptoError::InvalidKdfParams(format!(
                    "escrowed salt not base64: {e}"
                )))
            })?;
        KdfParams::new(salt, self.kdf_iterations).map_err(ClientError::Crypto)
    }
}

impl Drop for EscrowRecord {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// OS secure-store access (Keychain / Secret Service / Credential Manager)
#[derive(Clone)]
pub struct Escrow {
    service: String,
}

impl Escrow {
    /// Default service name used for keystore entries
    pub const DEFAULT_SERVICE: &'static str = "skyvault";

    /// Create an escrow store under the default service name
    pub fn new() -> Self {
        Self::with_service(Self::DEFAULT_SERVICE)
    }

    /// Create an escrow store under a custom service name
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Store credentials for one account
    pub fn store(&self, account_id: &str, password: &str, params: &KdfParams) -> Result<()> {
        use base64::Engine;
        let record = EscrowRecord {
            password: password.to_string(),
            kdf_salt: base64::engine::general_purpose::STANDARD.encode(&params.salt),
            kdf_iterations: params.iterations,
        };
        let mut payload = serde_json::to_string(&record)
            .map_err(|e| ClientError::SecureStore(e.to_string()))?;

        let entry = keyring::Entry::new(&self.service, account_id)
            .map_err(|e| ClientError::SecureStore(format!("entry creation: {e}")))?;
        let result = entry
            .set_password(&payload)
            .map_err(|e| ClientError::SecureStore(format!("store for '{account_id}': {e}")));
        payload.zeroize();
        result?;
        debug!(account = account_id, "stored escrow entry");
        Ok(())
    }

    /// Load credentials for one account, `None` when there is no entry
    pub fn load(&self, account_id: &str) -> Result<Option<EscrowRecord>> {
        let entry = keyring::Entry::new(&self.service, account_id)
            .map_err(|e| ClientError::SecureStore(format!("entry creation: {e}")))?;
        match entry.get_password() {
            Ok(mut payload) => {
                let record = serde_json::from_str(&payload)
                    .map_err(|e| ClientError::SecureStore(format!("bad escrow payload: {e}")));
                payload.zeroize();
                record.map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(ClientError::SecureStore(format!(
                "load for '{account_id}': {e}"
            ))),
        }
    }

    /// Delete the entry for one account; absent entries are fine
    pub fn clear(&self, account_id: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, account_id)
            .map_err(|e| ClientError::SecureStore(format!("entry creation: {e}")))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ClientError::SecureStore(format!(
                "delete for '{account_id}': {e}"
            ))),
        }
    }
}

impl Default for Escrow {
    fn default() -> Self {
        Self::new()
    }
}
