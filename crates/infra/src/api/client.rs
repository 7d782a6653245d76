use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use snapfig_common::TokenStore;
use snapfig_core::{CreditsApi, SessionApi, TransformApi};
use snapfig_domain::{
    ApiError, AppleIdentity, AuthPayload, CreditBalance, CreditHistoryEntry, CreditPackage, Page,
    PurchaseRequest, PurchaseResult, Result, ServiceInfo, SubscriptionUpdate, TransformRequest,
    Transformation, UserProfile,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::http::{store_error, Auth, HttpClient, RequestSpec};
use crate::paths;

/// Typed client for the Snapfig backend.
///
/// Wraps the HTTP core with one operation per endpoint. Every response is
/// unwrapped from the `{success, data, error, meta}` envelope here, so
/// callers only ever see typed domain data or a taxonomy error.
pub struct ApiClient {
    http: Arc<HttpClient>,
}

impl ApiClient {
    /// Build a client from configuration and a token store.
    ///
    /// # Errors
    /// Fails when the HTTP stack cannot initialize.
    pub fn new(config: ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let http = HttpClient::builder(tokens).config(config).build()?;
        Ok(Self { http: Arc::new(http) })
    }

    /// Wrap an already-built HTTP client.
    #[must_use]
    pub fn from_http(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Exchange an Apple identity assertion for a session.
    ///
    /// The returned token is persisted before this returns, so a stored
    /// token always equals the last one the server issued.
    ///
    /// # Errors
    /// [`ApiError::Validation`] for a blank assertion, before any network
    /// traffic.
    #[instrument(skip(self, identity))]
    pub async fn sign_in_with_apple(&self, identity: &AppleIdentity) -> Result<AuthPayload> {
        identity.validate()?;
        let body = encode(identity)?;
        let envelope = self
            .http
            .envelope::<AuthPayload>(RequestSpec::post(paths::AUTH_APPLE).json(body).auth(Auth::None))
            .await?;
        let payload = envelope.into_result()?;
        self.http.token_store().save(&payload.token).await.map_err(store_error)?;
        info!(user = %payload.user.id, "signed in");
        Ok(payload)
    }

    /// Refresh the current session, persisting the replacement token.
    ///
    /// # Errors
    /// A rejected refresh clears the stored token before the error returns.
    pub async fn refresh_session(&self) -> Result<AuthPayload> {
        self.http.refresh_session().await
    }

    /// Validate the stored token and fetch the profile behind it.
    ///
    /// Goes through the standard 401 refresh-retry, so an expired token that
    /// is still refreshable validates transparently; only a token the
    /// backend refuses to refresh surfaces as an error.
    pub async fn validate_session(&self) -> Result<UserProfile> {
        let envelope =
            self.http.envelope::<UserProfile>(RequestSpec::get(paths::AUTH_VALIDATE)).await?;
        envelope.into_result()
    }

    /// Fetch the signed-in user's profile.
    pub async fn current_user(&self) -> Result<UserProfile> {
        let envelope =
            self.http.envelope::<UserProfile>(RequestSpec::get(paths::USERS_ME)).await?;
        envelope.into_result()
    }

    /// Fetch the authoritative credit balance.
    pub async fn credit_balance(&self) -> Result<CreditBalance> {
        let envelope =
            self.http.envelope::<CreditBalance>(RequestSpec::get(paths::USERS_CREDITS)).await?;
        envelope.into_result()
    }

    /// Upload a photo and request a transformation.
    ///
    /// # Errors
    /// [`ApiError::NoFile`] / [`ApiError::Validation`] locally for an empty
    /// image or an oversized prompt; [`ApiError::InsufficientCredits`] when
    /// the backend rejects the charge.
    #[instrument(skip(self, request), fields(background = request.background.as_str()))]
    pub async fn transform_photo(&self, request: &TransformRequest) -> Result<Transformation> {
        request.validate()?;
        let form = || transform_form(request);
        let envelope = self
            .http
            .envelope::<Transformation>(RequestSpec::post(paths::TRANSFORM).multipart(&form))
            .await?;
        let transformation = envelope.into_result()?;
        debug!(id = %transformation.id, status = ?transformation.status, "transformation accepted");
        Ok(transformation)
    }

    /// Fetch a page of past transformations, newest first.
    pub async fn transform_history(&self, limit: u32, offset: u32) -> Result<Page<Transformation>> {
        let envelope = self
            .http
            .envelope::<Vec<Transformation>>(
                RequestSpec::get(paths::TRANSFORM_HISTORY).query("limit", limit).query("offset", offset),
            )
            .await?;
        let (items, meta) = envelope.into_page()?;
        Ok(Page { items, meta })
    }

    /// Fetch a single transformation by id.
    pub async fn transformation(&self, id: Uuid) -> Result<Transformation> {
        let path = format!("{}/{id}", paths::TRANSFORM);
        let envelope = self.http.envelope::<Transformation>(RequestSpec::get(&path)).await?;
        envelope.into_result()
    }

    /// List the purchasable credit packages.
    pub async fn credit_packages(&self) -> Result<Vec<CreditPackage>> {
        let envelope =
            self.http.envelope::<Vec<CreditPackage>>(RequestSpec::get(paths::PACKAGES)).await?;
        envelope.into_result()
    }

    /// Redeem an App Store receipt for credits.
    pub async fn purchase_credits(&self, purchase: &PurchaseRequest) -> Result<PurchaseResult> {
        let body = encode(purchase)?;
        let envelope = self
            .http
            .envelope::<PurchaseResult>(RequestSpec::post(paths::CREDITS_PURCHASE).json(body))
            .await?;
        let result = envelope.into_result()?;
        info!(credits = result.photo_credits, "purchase applied");
        Ok(result)
    }

    /// Change the subscription tier; returns the post-change balance.
    pub async fn update_subscription(&self, update: &SubscriptionUpdate) -> Result<CreditBalance> {
        let body = encode(update)?;
        let envelope = self
            .http
            .envelope::<CreditBalance>(RequestSpec::put(paths::CREDITS_SUBSCRIPTION).json(body))
            .await?;
        envelope.into_result()
    }

    /// Fetch a page of the credit ledger.
    pub async fn credit_history(&self, limit: u32, offset: u32) -> Result<Page<CreditHistoryEntry>> {
        let envelope = self
            .http
            .envelope::<Vec<CreditHistoryEntry>>(
                RequestSpec::get(paths::CREDITS_HISTORY).query("limit", limit).query("offset", offset),
            )
            .await?;
        let (items, meta) = envelope.into_page()?;
        Ok(Page { items, meta })
    }

    /// Reachability probe. Any failure reads as unhealthy.
    pub async fn health(&self) -> bool {
        match self.http.send(RequestSpec::get(paths::HEALTH).auth(Auth::None)).await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "health check failed");
                false
            }
        }
    }

    /// Fetch the root service descriptor, parsed leniently.
    ///
    /// The root endpoint predates the envelope convention; an unparseable
    /// body degrades to an empty descriptor rather than an error.
    pub async fn service_info(&self) -> Result<ServiceInfo> {
        let response = self.http.send(RequestSpec::get(paths::ROOT).auth(Auth::None)).await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, text));
        }
        Ok(response.json::<ServiceInfo>().await.unwrap_or_default())
    }

    /// End the local session.
    ///
    /// There is no sign-out endpoint; this clears the stored token and is
    /// never blocked by a failure. A broken store is logged and ignored so
    /// the caller can always reach the signed-out state.
    pub async fn sign_out(&self) -> Result<()> {
        if let Err(err) = self.http.token_store().clear().await {
            warn!(error = %err, "failed to clear stored session token during sign-out");
        }
        info!("signed out");
        Ok(())
    }

    /// Read the locally stored session token, if any.
    pub async fn stored_token(&self) -> Result<Option<String>> {
        self.http.token_store().load().await.map_err(store_error)
    }
}

#[async_trait]
impl SessionApi for ApiClient {
    async fn sign_in(&self, identity: &AppleIdentity) -> Result<AuthPayload> {
        self.sign_in_with_apple(identity).await
    }

    async fn refresh_session(&self) -> Result<AuthPayload> {
        ApiClient::refresh_session(self).await
    }

    async fn validate_session(&self) -> Result<UserProfile> {
        ApiClient::validate_session(self).await
    }

    async fn stored_token(&self) -> Result<Option<String>> {
        ApiClient::stored_token(self).await
    }

    async fn sign_out(&self) -> Result<()> {
        ApiClient::sign_out(self).await
    }
}

#[async_trait]
impl CreditsApi for ApiClient {
    async fn credit_balance(&self) -> Result<CreditBalance> {
        ApiClient::credit_balance(self).await
    }

    async fn purchase_credits(&self, purchase: &PurchaseRequest) -> Result<PurchaseResult> {
        ApiClient::purchase_credits(self, purchase).await
    }
}

#[async_trait]
impl TransformApi for ApiClient {
    async fn transform_photo(&self, request: &TransformRequest) -> Result<Transformation> {
        ApiClient::transform_photo(self, request).await
    }
}

/// Build the multipart form for a transformation upload.
///
/// Rebuilt from scratch for the 401 replay, since a sent form cannot be
/// reused.
fn transform_form(request: &TransformRequest) -> Form {
    let part = Part::bytes(request.image.bytes.clone()).file_name(request.image.file_name.clone());
    // A malformed mime type falls back to reqwest's default instead of
    // failing the upload
    let part = match part.mime_str(&request.image.mime_type) {
        Ok(part) => part,
        Err(_) => {
            Part::bytes(request.image.bytes.clone()).file_name(request.image.file_name.clone())
        }
    };

    let mut form =
        Form::new().part("image", part).text("backgroundType", request.background.as_str());
    if let Some(prompt) = &request.custom_prompt {
        form = form.text("customPrompt", prompt.clone());
    }
    form
}

fn encode<T: serde::Serialize>(body: &T) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|err| ApiError::Validation(format!("failed to encode request body: {err}")))
}
