//! Test doubles shared across the workspace

mod mocks;

pub use mocks::MemoryTokenStore;
