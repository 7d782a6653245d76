//! In-memory token store for deterministic tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{TokenStore, TokenStoreError};

/// In-memory [`TokenStore`] double
///
/// Behaves like the keychain store (single slot, last write wins, idempotent
/// clear) and records operation counts. Failure injection lets tests exercise
/// best-effort paths such as sign-out with a broken store.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<MemoryTokenStoreInner>,
}

#[derive(Default)]
struct MemoryTokenStoreInner {
    token: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    fail_clears: AtomicBool,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a token.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        let store = Self::default();
        *store.inner.token.lock() = Some(token.to_string());
        store
    }

    /// Synchronous peek at the current token.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.inner.token.lock().clone()
    }

    /// Make subsequent `save` calls fail.
    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `clear` calls fail.
    pub fn fail_clears(&self, fail: bool) {
        self.inner.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Number of successful `clear` calls.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.inner.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self.inner.token.lock().clone())
    }

    async fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(TokenStoreError::Backend("injected save failure".to_string()));
        }
        *self.inner.token.lock() = Some(token.to_string());
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        if self.inner.fail_clears.load(Ordering::SeqCst) {
            return Err(TokenStoreError::Backend("injected clear failure".to_string()));
        }
        *self.inner.token.lock() = None;
        self.inner.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
