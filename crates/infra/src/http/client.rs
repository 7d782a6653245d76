use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use snapfig_common::{TokenStore, TokenStoreError};
use snapfig_domain::{ApiError, AuthPayload, Envelope, ErrorCategory, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::paths;

/// HTTP client with bearer-token injection and a single 401 refresh-retry.
///
/// Every request flows through [`HttpClient::send`]: the stored session token
/// is attached, and when an authorized request comes back `401` the client
/// refreshes the token once and replays the request once. A second `401`
/// surfaces as an error; there is never a second refresh for the same call.
///
/// Refreshes are single-flight: concurrent `401`s queue on one gate, and
/// late arrivals reuse the token the first refresh produced instead of
/// issuing their own.
pub struct HttpClient {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    tokens: Arc<dyn TokenStore>,
    refresh_gate: Mutex<()>,
}

/// How a request authenticates.
///
/// The refresh call itself is the only authenticated request outside this
/// enum; it is issued directly by [`HttpClient::perform_refresh`] and is
/// the one place the 401 retry never applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth {
    /// No Authorization header (sign-in, health, root).
    None,
    /// Bearer token with the 401 refresh-retry.
    Bearer,
}

/// Request body variants.
///
/// Multipart forms are not replayable once built, so the body carries a
/// constructor instead of a form; the 401 retry rebuilds it.
pub(crate) enum Body<'a> {
    Empty,
    Json(serde_json::Value),
    Multipart(&'a (dyn Fn() -> Form + Send + Sync)),
}

/// A single request against the backend.
pub(crate) struct RequestSpec<'a> {
    method: Method,
    path: &'a str,
    query: Vec<(&'static str, String)>,
    body: Body<'a>,
    auth: Auth,
}

impl<'a> RequestSpec<'a> {
    pub(crate) fn new(method: Method, path: &'a str) -> Self {
        Self { method, path, query: Vec::new(), body: Body::Empty, auth: Auth::Bearer }
    }

    pub(crate) fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    pub(crate) fn post(path: &'a str) -> Self {
        Self::new(Method::POST, path)
    }

    pub(crate) fn put(path: &'a str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub(crate) fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub(crate) fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub(crate) fn multipart(mut self, form: &'a (dyn Fn() -> Form + Send + Sync)) -> Self {
        self.body = Body::Multipart(form);
        self
    }

    pub(crate) fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }
}

impl HttpClient {
    /// Start building a client around the given token store.
    pub fn builder(tokens: Arc<dyn TokenStore>) -> HttpClientBuilder {
        HttpClientBuilder { config: ApiConfig::default(), tokens, user_agent: None }
    }

    pub(crate) fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Execute a request, handling auth injection and the 401 retry.
    ///
    /// A missing stored token is not an error here: the request goes out
    /// without a header and the backend's `401` drives what happens next.
    pub(crate) async fn send(&self, spec: RequestSpec<'_>) -> Result<Response> {
        let token = match spec.auth {
            Auth::None => None,
            Auth::Bearer => self.tokens.load().await.map_err(store_error)?,
        };

        let response = self.dispatch(&spec, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || spec.auth != Auth::Bearer {
            return Ok(response);
        }

        debug!(path = spec.path, "request unauthorized, refreshing session token");
        match self.refresh_after_unauthorized(token.as_deref()).await {
            // One replay with the fresh token; a second 401 is final.
            Ok(fresh) => self.dispatch(&spec, Some(&fresh)).await,
            Err(refresh_err) => {
                warn!(path = spec.path, error = %refresh_err, "session token refresh failed");
                Err(error_from_response(response).await)
            }
        }
    }

    /// Execute a request and parse the response envelope.
    ///
    /// # Errors
    /// Non-2xx responses are mapped through the envelope error body when one
    /// is present, or by HTTP status otherwise. A 2xx response that does not
    /// parse as an envelope is a server fault.
    pub(crate) async fn envelope<T>(&self, spec: RequestSpec<'_>) -> Result<Envelope<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.send(spec).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        match response.json::<Envelope<T>>().await {
            Ok(envelope) => Ok(envelope),
            Err(err) if err.is_timeout() => Err(ApiError::Timeout(self.timeout)),
            Err(_) => Err(ApiError::Server("malformed response envelope".to_string())),
        }
    }

    /// Force a session-token refresh, persisting the new token.
    ///
    /// # Errors
    /// [`ApiError::AuthenticationRequired`] when no token is stored. A
    /// refresh the backend rejects clears the stored token before the error
    /// is returned, so a stale credential is never retried.
    pub async fn refresh_session(&self) -> Result<AuthPayload> {
        let _guard = self.refresh_gate.lock().await;
        let Some(current) = self.tokens.load().await.map_err(store_error)? else {
            return Err(ApiError::AuthenticationRequired(
                "no stored session token".to_string(),
            ));
        };

        match self.perform_refresh(&current).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                if err.category() == ErrorCategory::Authentication {
                    self.clear_tokens().await;
                }
                Err(err)
            }
        }
    }

    /// Refresh path for the in-flight 401 retry.
    ///
    /// Returns the token to replay with. If another request already
    /// refreshed while this one waited on the gate, the newer stored token
    /// is reused without a network call.
    async fn refresh_after_unauthorized(&self, rejected: Option<&str>) -> Result<String> {
        let _guard = self.refresh_gate.lock().await;
        let Some(current) = self.tokens.load().await.map_err(store_error)? else {
            return Err(ApiError::AuthenticationRequired(
                "no stored session token".to_string(),
            ));
        };

        if rejected.is_some_and(|rej| rej != current) {
            debug!("stored token already rotated, reusing it");
            return Ok(current);
        }

        match self.perform_refresh(&current).await {
            Ok(payload) => Ok(payload.token),
            Err(err) => {
                if err.category() == ErrorCategory::Authentication {
                    self.clear_tokens().await;
                }
                Err(err)
            }
        }
    }

    /// Call the refresh endpoint with the given token and persist the result.
    async fn perform_refresh(&self, token: &str) -> Result<AuthPayload> {
        let url = format!("{}{}", self.base_url, paths::AUTH_REFRESH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| self.transport_error(&err))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let envelope = match response.json::<Envelope<AuthPayload>>().await {
            Ok(envelope) => envelope,
            Err(err) if err.is_timeout() => return Err(ApiError::Timeout(self.timeout)),
            Err(_) => return Err(ApiError::Server("malformed response envelope".to_string())),
        };
        let payload = envelope.into_result()?;
        self.tokens.save(&payload.token).await.map_err(store_error)?;
        debug!("session token refreshed");
        Ok(payload)
    }

    async fn dispatch(&self, spec: &RequestSpec<'_>, token: Option<&str>) -> Result<Response> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut builder = self.client.request(spec.method.clone(), &url);

        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        builder = match &spec.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart(form) => builder.multipart(form()),
        };
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        debug!(method = %spec.method, %url, "sending request");
        builder.send().await.map_err(|err| self.transport_error(&err))
    }

    fn transport_error(&self, err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(err.to_string())
        }
    }

    async fn clear_tokens(&self) {
        if let Err(err) = self.tokens.clear().await {
            warn!(error = %err, "failed to clear stored session token");
        }
    }
}

/// Map a non-2xx response to a taxonomy error.
///
/// Prefers the machine-readable envelope error body; responses without one
/// (proxies, crashed handlers) fall back to the HTTP status.
async fn error_from_response(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    if let Ok(envelope) = serde_json::from_str::<Envelope<serde_json::Value>>(&text) {
        if let Err(err) = envelope.into_ack() {
            return err;
        }
    }
    ApiError::from_status(status, text)
}

pub(crate) fn store_error(err: TokenStoreError) -> ApiError {
    ApiError::InvalidToken(format!("session token store: {err}"))
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    config: ApiConfig,
    tokens: Arc<dyn TokenStore>,
    user_agent: Option<String>,
}

impl HttpClientBuilder {
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// # Errors
    /// [`ApiError::Validation`] for an unparseable base URL; otherwise fails
    /// only when the underlying TLS/connection stack cannot initialize.
    pub fn build(self) -> Result<HttpClient> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|err| ApiError::Validation(format!("invalid base URL: {err}")))?;

        let mut builder = ReqwestClient::builder().timeout(self.config.timeout).no_proxy();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder
            .build()
            .map_err(|err| ApiError::Network(format!("failed to build http client: {err}")))?;

        Ok(HttpClient {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            timeout: self.config.timeout,
            tokens: self.tokens,
            refresh_gate: Mutex::new(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use snapfig_common::testing::MemoryTokenStore;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer, store: &MemoryTokenStore) -> HttpClient {
        HttpClient::builder(Arc::new(store.clone()))
            .config(
                ApiConfig::default()
                    .with_base_url(server.uri())
                    .with_timeout(Duration::from_millis(500)),
            )
            .build()
            .unwrap()
    }

    fn auth_envelope(token: &str) -> Value {
        json!({
            "success": true,
            "data": {
                "user": { "id": Uuid::new_v4() },
                "token": token
            }
        })
    }

    #[test]
    fn invalid_base_url_is_rejected_at_build() {
        let result = HttpClient::builder(Arc::new(MemoryTokenStore::new()))
            .config(ApiConfig::default().with_base_url("not a url"))
            .build();
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn injects_bearer_token_from_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": { "id": Uuid::new_v4() } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("tok-1");
        let client = client(&server, &store);

        let envelope: Envelope<Value> =
            client.envelope(RequestSpec::get(paths::USERS_ME)).await.unwrap();
        assert!(envelope.into_result().is_ok());
    }

    #[tokio::test]
    async fn unauthenticated_requests_carry_no_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("tok-1");
        let client = client(&server, &store);

        let response =
            client.send(RequestSpec::get(paths::HEALTH).auth(Auth::None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn refreshes_once_and_replays_after_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_envelope("fresh")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": { "id": Uuid::new_v4() } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("stale");
        let client = client(&server, &store);

        let envelope: Envelope<Value> =
            client.envelope(RequestSpec::get(paths::USERS_ME)).await.unwrap();
        assert!(envelope.into_result().is_ok());
        assert_eq!(store.current().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn second_unauthorized_is_final() {
        let server = MockServer::start().await;

        // Original attempt and the single replay, never a third
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_envelope("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("stale");
        let client = client(&server, &store);

        let result: Result<Envelope<Value>> =
            client.envelope(RequestSpec::get(paths::USERS_ME)).await;
        assert!(matches!(result, Err(ApiError::AuthenticationRequired(_))));
    }

    #[tokio::test]
    async fn rejected_refresh_clears_token_and_keeps_original_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "error": { "message": "token expired", "code": "INVALID_TOKEN" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("stale");
        let client = client(&server, &store);

        let result: Result<Envelope<Value>> =
            client.envelope(RequestSpec::get(paths::USERS_ME)).await;
        assert!(matches!(result, Err(ApiError::InvalidToken(_))));
        assert_eq!(store.current(), None);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_requests_share_one_refresh() {
        let server = MockServer::start().await;

        // Either one or both callers race in with the stale token before the
        // first refresh lands.
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1..=2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_envelope("fresh")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": { "id": Uuid::new_v4() } })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("stale");
        let client = client(&server, &store);

        // The late arrival must reuse the token the first refresh produced
        // instead of issuing its own.
        let (first, second): (Result<Envelope<Value>>, Result<Envelope<Value>>) = tokio::join!(
            client.envelope(RequestSpec::get(paths::USERS_ME)),
            client.envelope(RequestSpec::get(paths::USERS_ME)),
        );
        assert!(first.unwrap().into_result().is_ok());
        assert!(second.unwrap().into_result().is_ok());
        assert_eq!(store.current().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn slow_responses_map_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/me"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("tok");
        let client = client(&server, &store);

        let result: Result<Envelope<Value>> =
            client.envelope(RequestSpec::get(paths::USERS_ME)).await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }

    #[tokio::test]
    async fn envelope_error_codes_map_to_taxonomy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/packages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "error": { "message": "limit out of range", "code": "VALIDATION_ERROR" }
            })))
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("tok");
        let client = client(&server, &store);

        let result: Result<Envelope<Value>> =
            client.envelope(RequestSpec::get(paths::PACKAGES)).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn statuses_without_envelope_fall_back_to_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/packages"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("tok");
        let client = client(&server, &store);

        let result: Result<Envelope<Value>> =
            client.envelope(RequestSpec::get(paths::PACKAGES)).await;
        assert!(matches!(result, Err(ApiError::Server(_))));
    }

    #[tokio::test]
    async fn forced_refresh_persists_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_envelope("fresh")))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::with_token("old");
        let client = client(&server, &store);

        let payload = client.refresh_session().await.unwrap();
        assert_eq!(payload.token, "fresh");
        assert_eq!(store.current().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn forced_refresh_without_token_fails_before_any_request() {
        let server = MockServer::start().await;

        let store = MemoryTokenStore::new();
        let client = client(&server, &store);

        let result = client.refresh_session().await;
        assert!(matches!(result, Err(ApiError::AuthenticationRequired(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
