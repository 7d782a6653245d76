//! HTTP client core
//!
//! Owns everything below the typed façade: URL resolution, bearer-token
//! injection, the single 401 refresh-retry, timeout handling, and the
//! envelope/status error mapping.

mod client;

pub use client::{HttpClient, HttpClientBuilder};
pub(crate) use client::{store_error, Auth, RequestSpec};
