//! Wire-level value objects for the photo-transformation backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ApiError, Result};

/// Maximum length of a user-supplied transformation prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 200;

/// Authenticated user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Subscription tier attached to an account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    None,
    Standard,
    Pro,
}

/// Authoritative credit balance snapshot from the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub photo_credits: u32,
    pub subscription_tier: SubscriptionTier,
}

/// Background style applied during transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStyle {
    Cartoon,
    Lego,
    Photo,
}

impl BackgroundStyle {
    /// Wire name used in multipart form fields
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cartoon => "cartoon",
            Self::Lego => "lego",
            Self::Photo => "photo",
        }
    }
}

/// Processing status of a transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStatus {
    Processing,
    Completed,
    Failed,
}

/// Local image selected for upload
///
/// Carried as raw bytes plus upload metadata; the picker subsystem that
/// produces it is outside this workspace.
#[derive(Clone)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .finish()
    }
}

/// Request to transform a photo
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub image: ImagePayload,
    pub background: BackgroundStyle,
    pub custom_prompt: Option<String>,
}

impl TransformRequest {
    /// Validate the request before any network traffic.
    ///
    /// # Errors
    /// [`ApiError::NoFile`] for an empty image, [`ApiError::Validation`] for
    /// a prompt exceeding [`MAX_PROMPT_CHARS`].
    pub fn validate(&self) -> Result<()> {
        if self.image.bytes.is_empty() {
            return Err(ApiError::NoFile("image payload is empty".to_string()));
        }
        if let Some(prompt) = &self.custom_prompt {
            let chars = prompt.chars().count();
            if chars > MAX_PROMPT_CHARS {
                return Err(ApiError::Validation(format!(
                    "custom prompt is {chars} characters, maximum is {MAX_PROMPT_CHARS}"
                )));
            }
        }
        Ok(())
    }
}

/// Completed or in-flight transformation record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transformation {
    pub id: Uuid,
    pub background_type: BackgroundStyle,
    pub status: TransformStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    pub credits_used: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Apple Sign-In identity assertion forwarded to the backend
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleIdentity {
    pub identity_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AppleIdentity {
    /// Reject obviously malformed assertions before calling the backend.
    ///
    /// # Errors
    /// [`ApiError::Validation`] when the identity token is empty.
    pub fn validate(&self) -> Result<()> {
        if self.identity_token.trim().is_empty() {
            return Err(ApiError::Validation("identity token is empty".to_string()));
        }
        Ok(())
    }
}

/// Payload returned by sign-in and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: UserProfile,
    pub token: String,
}

/// Purchasable credit package
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: String,
    pub name: String,
    pub credits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<u32>,
}

/// Credit purchase request (App Store receipt based)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub package_id: String,
    pub receipt: String,
}

/// Result of a credit purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub photo_credits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Subscription tier change request
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdate {
    pub tier: SubscriptionTier,
}

/// Single entry in the credit ledger history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditHistoryEntry {
    pub id: Uuid,
    pub amount: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Paginated list payload
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: Option<crate::envelope::PageMeta>,
}

/// Root endpoint service descriptor, parsed leniently
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
