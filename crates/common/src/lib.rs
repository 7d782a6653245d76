//! Shared infrastructure for the Snapfig client core
//!
//! Currently this is the session-token store: a trait abstracting the single
//! secure key the client persists, the platform-keychain implementation, and
//! an in-memory double for tests.

pub mod auth;
pub mod testing;

pub use auth::{KeyringTokenStore, TokenStore, TokenStoreError};
