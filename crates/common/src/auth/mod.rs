//! Session-token persistence
//!
//! The backend issues one opaque bearer token per session. This module owns
//! its storage: a [`TokenStore`] trait so the HTTP core and tests can inject
//! their own backends, and [`KeyringTokenStore`] for the platform keychain.

mod store;

pub use store::{KeyringTokenStore, TokenStore, TokenStoreError};
