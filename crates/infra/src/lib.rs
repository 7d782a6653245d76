//! # Snapfig Infrastructure
//!
//! Infrastructure implementations of the core ports.
//!
//! This crate contains:
//! - The HTTP client core (auth injection, 401 refresh-retry, timeout)
//! - The typed API façade over the backend's endpoint set
//! - Configuration loading
//!
//! ## Architecture
//! - Implements the port traits defined in `snapfig-core`
//! - Depends on `snapfig-common` (token store) and `snapfig-domain` (types)
//! - Contains all network I/O

pub mod api;
pub mod config;
pub mod http;
mod paths;

pub use api::ApiClient;
pub use config::ApiConfig;
pub use http::HttpClient;
