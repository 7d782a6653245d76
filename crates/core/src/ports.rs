//! Backend port interfaces consumed by the state machines
//!
//! Implemented by the API façade in the infra crate; mocked in tests so the
//! state machines can be exercised without a network.

use async_trait::async_trait;
use snapfig_domain::{
    AppleIdentity, AuthPayload, CreditBalance, PurchaseRequest, PurchaseResult, Result,
    TransformRequest, Transformation, UserProfile,
};

/// Auth lifecycle operations
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Exchange an Apple identity assertion for a session (persists token)
    async fn sign_in(&self, identity: &AppleIdentity) -> Result<AuthPayload>;

    /// Refresh the current session (persists the replacement token)
    async fn refresh_session(&self) -> Result<AuthPayload>;

    /// Validate the stored session token and fetch the profile behind it
    async fn validate_session(&self) -> Result<UserProfile>;

    /// Read the locally stored session token, if any
    async fn stored_token(&self) -> Result<Option<String>>;

    /// Clear the local session; must never be blocked by network failure
    async fn sign_out(&self) -> Result<()>;
}

/// Credit balance and billing operations
#[async_trait]
pub trait CreditsApi: Send + Sync {
    /// Fetch the authoritative balance
    async fn credit_balance(&self) -> Result<CreditBalance>;

    /// Redeem a purchase receipt for credits
    async fn purchase_credits(&self, purchase: &PurchaseRequest) -> Result<PurchaseResult>;
}

/// Photo transformation operations
#[async_trait]
pub trait TransformApi: Send + Sync {
    /// Upload a photo and request a transformation
    async fn transform_photo(&self, request: &TransformRequest) -> Result<Transformation>;
}
