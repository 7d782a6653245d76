//! Uniform response envelope
//!
//! Every backend response is wrapped in `{success, data?, error?, meta?}`.
//! [`Envelope::into_result`] is the single place that turns an envelope into
//! either typed data or a taxonomy error, so individual façade operations
//! never inspect `success` themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ApiError, Result};

/// Response envelope wrapping every backend payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

/// Structured error payload reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Pagination metadata for list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Envelope<T> {
    /// Unwrap the envelope into typed data.
    ///
    /// # Errors
    /// Returns the taxonomy error carried by the envelope when
    /// `success = false`, or [`ApiError::Server`] when a successful envelope
    /// is missing its data payload.
    pub fn into_result(self) -> Result<T> {
        if self.success {
            self.data
                .ok_or_else(|| ApiError::Server("response envelope missing data".to_string()))
        } else {
            Err(Self::map_error(self.error))
        }
    }

    /// Unwrap the envelope and its pagination metadata together.
    ///
    /// # Errors
    /// Same conditions as [`Envelope::into_result`].
    pub fn into_page(self) -> Result<(T, Option<PageMeta>)> {
        if self.success {
            let meta = self.meta;
            self.data
                .map(|data| (data, meta))
                .ok_or_else(|| ApiError::Server("response envelope missing data".to_string()))
        } else {
            Err(Self::map_error(self.error))
        }
    }

    /// Unwrap an envelope whose data payload is irrelevant (acknowledgements).
    ///
    /// # Errors
    /// Returns the carried taxonomy error when `success = false`.
    pub fn into_ack(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Self::map_error(self.error))
        }
    }

    fn map_error(body: Option<ErrorBody>) -> ApiError {
        match body {
            Some(err) => {
                let message = err.message;
                match err.code {
                    Some(code) => ApiError::from_code(&code, message, err.details.as_ref()),
                    None => ApiError::Server(message),
                }
            }
            None => ApiError::Server("request failed without error details".to_string()),
        }
    }
}
