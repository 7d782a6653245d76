//! Client configuration
//!
//! Loads API client settings from environment variables with sensible
//! defaults, so the client works out of the box against production.
//!
//! ## Environment Variables
//! - `SNAPFIG_API_BASE_URL`: Backend base URL (default: production)
//! - `SNAPFIG_API_TIMEOUT_SECS`: Request timeout in seconds (default: 30)

use std::time::Duration;

/// Production backend base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.snapfig.app";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL the client resolves endpoint paths against.
    pub base_url: String,
    /// Timeout applied to every request, uploads included.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_BASE_URL.to_string(), timeout: DEFAULT_TIMEOUT }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables
    ///
    /// Missing variables fall back to defaults. An unparseable timeout is
    /// logged and replaced by the default rather than failing startup.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SNAPFIG_API_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout = std::env::var("SNAPFIG_API_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    tracing::warn!(value = %raw, "Invalid SNAPFIG_API_TIMEOUT_SECS, using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_TIMEOUT);

        Self { base_url, timeout }
    }

    /// Override the base URL (used by tests to point at a mock server)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_production() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = ApiConfig::default()
            .with_base_url("http://localhost:3000/")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.base_url, "http://localhost:3000/");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
