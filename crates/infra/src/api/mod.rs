//! Typed API façade
//!
//! One operation per backend endpoint, each returning typed domain data or
//! a taxonomy error. Implements the port traits from `snapfig-core`.

mod client;

pub use client::ApiClient;
