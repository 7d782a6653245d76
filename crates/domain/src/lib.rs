//! Domain types for the Snapfig client core
//!
//! This crate owns everything that crosses the wire to the
//! photo-transformation backend: the uniform response envelope, the typed
//! value objects for auth, credits, and transformations, and the error
//! taxonomy every other crate normalizes into. It has no I/O of its own.

pub mod envelope;
pub mod errors;
pub mod types;

pub use envelope::{Envelope, ErrorBody, PageMeta};
pub use errors::{ApiError, ErrorCategory, Result};
pub use types::{
    AppleIdentity, AuthPayload, BackgroundStyle, CreditBalance, CreditHistoryEntry, CreditPackage,
    ImagePayload, Page, PurchaseRequest, PurchaseResult, ServiceInfo, SubscriptionTier,
    SubscriptionUpdate, TransformRequest, TransformStatus, Transformation, UserProfile,
    MAX_PROMPT_CHARS,
};
