//! Token store trait and platform keychain implementation

use async_trait::async_trait;
use tracing::debug;

/// Error type for token store operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenStoreError {
    /// The platform secure storage cannot be opened
    #[error("Secure storage unavailable: {0}")]
    Unavailable(String),

    /// A read/write/delete against secure storage failed
    #[error("Secure storage operation failed: {0}")]
    Backend(String),
}

/// Trait for persisting the single session token
///
/// The store holds at most one token; `save` overwrites unconditionally
/// (last write wins) and `clear` is idempotent.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the current session token, if any.
    ///
    /// # Errors
    /// Returns error only when the storage backend fails; an absent token is
    /// `Ok(None)`.
    async fn load(&self) -> Result<Option<String>, TokenStoreError>;

    /// Persist a new session token, replacing any previous value.
    ///
    /// # Errors
    /// Returns error if the storage backend rejects the write.
    async fn save(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Remove the stored session token. Clearing an empty store succeeds.
    ///
    /// # Errors
    /// Returns error if the storage backend fails the deletion.
    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Session-token store backed by the platform keychain
///
/// Uses macOS Keychain, Windows Credential Manager, or the Linux Secret
/// Service depending on the target, namespaced by service and account name.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
    account: String,
}

impl KeyringTokenStore {
    /// Create a store addressing one keychain entry.
    ///
    /// # Arguments
    /// * `service` - Keychain service name (e.g., "Snapfig")
    /// * `account` - Keychain account name (e.g., "sessionToken")
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    /// Keychain service name this store addresses
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Keychain account name this store addresses
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<keyring::Entry, TokenStoreError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| TokenStoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(TokenStoreError::Backend(err.to_string())),
        }
    }

    async fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        debug!(service = %self.service, account = %self.account, "storing session token");
        self.entry()?.set_password(token).map_err(|e| TokenStoreError::Backend(e.to_string()))
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        debug!(service = %self.service, account = %self.account, "clearing session token");
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(TokenStoreError::Backend(err.to_string())),
        }
    }
}
