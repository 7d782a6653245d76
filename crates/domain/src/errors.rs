//! Error taxonomy for backend operations
//!
//! Every failure surfaced by the HTTP core or the API façade is normalized
//! into [`ApiError`]. Variants mirror the machine-readable codes the backend
//! reports in its response envelope; network-level failures (no response,
//! timeout) get their own variants. Nothing below the state machines swallows
//! an error — the single locally-recovered case is the 401 refresh-retry
//! inside the HTTP core.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Categories of API errors for classification and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Authentication/authorization errors (401, 403)
    Authentication,
    /// Input or request-shape errors - non-retryable
    Validation,
    /// Credit and billing errors - non-retryable, actionable by the user
    Credits,
    /// Rate limiting (429) - retryable with delay
    RateLimit,
    /// Server-side failures (5xx) - retryable
    Server,
    /// Network/connection/timeout errors - retryable
    Network,
}

/// Unified error type for all backend client operations
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No image file provided: {0}")]
    NoFile(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: u32, available: u32 },

    #[error("Transformation failed: {0}")]
    Transformation(String),

    #[error("Purchase failed: {0}")]
    Purchase(String),

    #[error("Subscription update failed: {0}")]
    Subscription(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Map a machine-readable envelope error code to a taxonomy variant.
    ///
    /// Unknown codes fall back to [`ApiError::Server`] carrying the
    /// server-provided message so nothing is silently dropped.
    #[must_use]
    pub fn from_code(code: &str, message: String, details: Option<&Value>) -> Self {
        match code {
            "AUTHENTICATION_REQUIRED" => Self::AuthenticationRequired(message),
            "INVALID_TOKEN" => Self::InvalidToken(message),
            "ACCESS_DENIED" => Self::AccessDenied(message),
            "VALIDATION_ERROR" => Self::Validation(message),
            "NO_FILE" => Self::NoFile(message),
            "INVALID_IMAGE" => Self::InvalidImage(message),
            "INSUFFICIENT_CREDITS" => {
                // Counts outside u32 range are nonsense for a credit ledger;
                // treat them like missing details.
                let required = details
                    .and_then(|d| d.get("required"))
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(1);
                let available = details
                    .and_then(|d| d.get("available"))
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0);
                Self::InsufficientCredits { required, available }
            }
            "TRANSFORMATION_ERROR" => Self::Transformation(message),
            "PURCHASE_ERROR" => Self::Purchase(message),
            "SUBSCRIPTION_ERROR" => Self::Subscription(message),
            "RATE_LIMITED" => Self::RateLimited(message),
            "SERVICE_UNAVAILABLE" => Self::ServiceUnavailable(message),
            // Unknown codes degrade to a generic server error
            _ => Self::Server(message),
        }
    }

    /// Map a bare HTTP status to a taxonomy variant.
    ///
    /// Used when a response carries no parseable envelope (proxies, crashed
    /// handlers). The message keeps whatever body text was available.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::AuthenticationRequired(message),
            403 => Self::AccessDenied(message),
            413 | 415 => Self::InvalidImage(message),
            429 => Self::RateLimited(message),
            503 => Self::ServiceUnavailable(message),
            500..=599 => Self::Server(message),
            _ => Self::Validation(message),
        }
    }

    /// Get the error category for this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationRequired(_) | Self::InvalidToken(_) | Self::AccessDenied(_) => {
                ErrorCategory::Authentication
            }
            Self::Validation(_) | Self::NoFile(_) | Self::InvalidImage(_) => {
                ErrorCategory::Validation
            }
            Self::InsufficientCredits { .. } | Self::Purchase(_) | Self::Subscription(_) => {
                ErrorCategory::Credits
            }
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::Transformation(_) | Self::Server(_) | Self::ServiceUnavailable(_) => {
                ErrorCategory::Server
            }
            Self::Network(_) | Self::Timeout(_) => ErrorCategory::Network,
        }
    }

    /// Check whether retrying the operation could succeed without user action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Server | ErrorCategory::Network
        )
    }
}
