//! Credit reconciliation state machine
//!
//! The displayed balance is allowed to run ahead of the server for exactly
//! one round trip: a transform tap decrements it optimistically, and every
//! transform attempt ends with an unconditional authoritative resync that
//! overwrites the optimistic value. Financial truth always comes from the
//! server; the optimistic path is never allowed to become final state.

use std::sync::Arc;

use snapfig_domain::{
    ApiError, CreditBalance, PurchaseRequest, PurchaseResult, Result, TransformRequest,
    Transformation,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ports::{CreditsApi, TransformApi};

/// Credit ledger phase
#[derive(Debug, Clone)]
pub enum CreditPhase {
    Idle,
    Loading,
    Ready(CreditBalance),
    Error(String),
}

impl CreditPhase {
    /// Displayed credit count, when one is known
    #[must_use]
    pub fn displayed_credits(&self) -> Option<u32> {
        match self {
            Self::Ready(balance) => Some(balance.photo_credits),
            _ => None,
        }
    }
}

/// Events fed to the credit transition function
#[derive(Debug, Clone)]
pub enum CreditEvent {
    FetchStarted,
    FetchSucceeded(CreditBalance),
    FetchFailed(String),
}

/// Pure transition function for the fetch cycle
///
/// The optimistic decrement is deliberately not an event here: it is a
/// side-channel adjustment applied to a `Ready` balance without leaving the
/// phase (see [`CreditManager::transform_photo`]).
#[must_use]
pub fn transition(_phase: &CreditPhase, event: CreditEvent) -> CreditPhase {
    match event {
        CreditEvent::FetchStarted => CreditPhase::Loading,
        CreditEvent::FetchSucceeded(balance) => CreditPhase::Ready(balance),
        CreditEvent::FetchFailed(message) => CreditPhase::Error(message),
    }
}

/// Async driver reconciling local credit state with the backend
pub struct CreditManager<C: CreditsApi, T: TransformApi> {
    credits: Arc<C>,
    transforms: Arc<T>,
    phase: RwLock<CreditPhase>,
}

impl<C: CreditsApi, T: TransformApi> CreditManager<C, T> {
    /// Create a manager in the `Idle` phase.
    #[must_use]
    pub fn new(credits: Arc<C>, transforms: Arc<T>) -> Self {
        Self { credits, transforms, phase: RwLock::new(CreditPhase::Idle) }
    }

    /// Current phase snapshot
    pub async fn phase(&self) -> CreditPhase {
        self.phase.read().await.clone()
    }

    /// Displayed credit count, when one is known
    pub async fn displayed_credits(&self) -> Option<u32> {
        self.phase.read().await.displayed_credits()
    }

    async fn apply(&self, event: CreditEvent) {
        let mut phase = self.phase.write().await;
        *phase = transition(&phase, event);
    }

    /// Authoritative balance fetch, overwriting any optimistic value.
    ///
    /// # Errors
    /// Propagates the façade error; the phase becomes `Error(message)`.
    pub async fn refresh(&self) -> Result<CreditBalance> {
        self.apply(CreditEvent::FetchStarted).await;

        match self.credits.credit_balance().await {
            Ok(balance) => {
                debug!(credits = balance.photo_credits, "credit balance synced");
                self.apply(CreditEvent::FetchSucceeded(balance)).await;
                Ok(balance)
            }
            Err(err) => {
                warn!(error = %err, "credit balance fetch failed");
                self.apply(CreditEvent::FetchFailed(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Run a transformation with optimistic decrement and mandatory resync.
    ///
    /// Sequence: validate locally, reject on a known-zero balance before any
    /// network call, decrement the displayed balance by one (floored at
    /// zero), upload, then resync exactly once regardless of the upload
    /// outcome.
    ///
    /// # Errors
    /// Local validation errors, [`ApiError::InsufficientCredits`] on a
    /// known-zero balance, or whatever the transform call itself surfaced.
    pub async fn transform_photo(&self, request: &TransformRequest) -> Result<Transformation> {
        request.validate()?;

        if self.displayed_credits().await == Some(0) {
            return Err(ApiError::InsufficientCredits { required: 1, available: 0 });
        }

        self.decrement_optimistically().await;

        let outcome = self.transforms.transform_photo(request).await;

        // Unconditional: optimistic drift must not outlive this attempt.
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "post-transform resync failed");
        }

        match &outcome {
            Ok(transformation) => {
                info!(id = %transformation.id, credits_used = transformation.credits_used,
                    "transformation accepted");
            }
            Err(err) => warn!(error = %err, "transformation failed"),
        }
        outcome
    }

    /// Redeem a purchase, then resync the authoritative balance.
    ///
    /// # Errors
    /// Propagates purchase failures; the pre-purchase balance stays in place.
    pub async fn purchase_credits(&self, purchase: &PurchaseRequest) -> Result<PurchaseResult> {
        let result = self.credits.purchase_credits(purchase).await?;
        info!(credits = result.photo_credits, "purchase applied");

        if let Err(err) = self.refresh().await {
            warn!(error = %err, "post-purchase resync failed");
        }
        Ok(result)
    }

    /// Subtract one displayed credit without leaving the current phase.
    async fn decrement_optimistically(&self) {
        let mut phase = self.phase.write().await;
        if let CreditPhase::Ready(balance) = &mut *phase {
            balance.photo_credits = balance.photo_credits.saturating_sub(1);
            debug!(credits = balance.photo_credits, "optimistic decrement applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use snapfig_domain::{
        BackgroundStyle, ImagePayload, SubscriptionTier, TransformStatus,
    };
    use uuid::Uuid;

    use super::*;

    fn balance(photo_credits: u32) -> CreditBalance {
        CreditBalance { photo_credits, subscription_tier: SubscriptionTier::Standard }
    }

    fn sample_request() -> TransformRequest {
        TransformRequest {
            image: ImagePayload {
                file_name: "portrait.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                bytes: vec![1, 2, 3],
            },
            background: BackgroundStyle::Cartoon,
            custom_prompt: None,
        }
    }

    fn sample_transformation() -> Transformation {
        Transformation {
            id: Uuid::new_v4(),
            background_type: BackgroundStyle::Cartoon,
            status: TransformStatus::Completed,
            result_url: Some("https://cdn.example.com/out.png".to_string()),
            credits_used: 1,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    /// Scriptable CreditsApi double; `balances` is drained fetch by fetch.
    #[derive(Default)]
    struct ScriptedCreditsApi {
        balances: Mutex<Vec<Result<CreditBalance>>>,
        purchase_result: Mutex<Option<Result<PurchaseResult>>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl CreditsApi for ScriptedCreditsApi {
        async fn credit_balance(&self) -> Result<CreditBalance> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.balances.lock().remove(0)
        }

        async fn purchase_credits(&self, _purchase: &PurchaseRequest) -> Result<PurchaseResult> {
            self.purchase_result.lock().take().unwrap()
        }
    }

    #[derive(Default)]
    struct ScriptedTransformApi {
        result: Mutex<Option<Result<Transformation>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransformApi for ScriptedTransformApi {
        async fn transform_photo(&self, _request: &TransformRequest) -> Result<Transformation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.lock().take().unwrap()
        }
    }

    fn manager(
        credits: Arc<ScriptedCreditsApi>,
        transforms: Arc<ScriptedTransformApi>,
    ) -> CreditManager<ScriptedCreditsApi, ScriptedTransformApi> {
        CreditManager::new(credits, transforms)
    }

    #[test]
    fn fetch_cycle_transitions() {
        let phase = transition(&CreditPhase::Idle, CreditEvent::FetchStarted);
        assert!(matches!(phase, CreditPhase::Loading));

        let phase = transition(&phase, CreditEvent::FetchSucceeded(balance(3)));
        assert_eq!(phase.displayed_credits(), Some(3));

        let phase = transition(&phase, CreditEvent::FetchFailed("offline".to_string()));
        assert!(matches!(phase, CreditPhase::Error(_)));
    }

    #[tokio::test]
    async fn one_credit_scenario_settles_at_server_truth() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        // Initial fetch sees 1 credit; post-transform resync sees 0.
        *credits.balances.lock() = vec![Ok(balance(1)), Ok(balance(0))];
        let transforms = Arc::new(ScriptedTransformApi::default());
        *transforms.result.lock() = Some(Ok(sample_transformation()));

        let manager = manager(credits.clone(), transforms);
        manager.refresh().await.unwrap();
        assert_eq!(manager.displayed_credits().await, Some(1));

        let result = manager.transform_photo(&sample_request()).await;
        assert!(result.is_ok());
        assert_eq!(manager.displayed_credits().await, Some(0));
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_balance_is_rejected_before_any_network_call() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(0))];
        let transforms = Arc::new(ScriptedTransformApi::default());

        let manager = manager(credits.clone(), transforms.clone());
        manager.refresh().await.unwrap();

        let result = manager.transform_photo(&sample_request()).await;
        assert!(matches!(
            result,
            Err(ApiError::InsufficientCredits { required: 1, available: 0 })
        ));
        assert_eq!(transforms.calls.load(Ordering::SeqCst), 0);
        // Only the initial fetch happened; a local rejection triggers no resync.
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(manager.displayed_credits().await, Some(0));
    }

    #[tokio::test]
    async fn failed_transform_still_resyncs_exactly_once() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(4)), Ok(balance(4))];
        let transforms = Arc::new(ScriptedTransformApi::default());
        *transforms.result.lock() =
            Some(Err(ApiError::Transformation("model crashed".to_string())));

        let manager = manager(credits.clone(), transforms);
        manager.refresh().await.unwrap();

        let result = manager.transform_photo(&sample_request()).await;
        assert!(matches!(result, Err(ApiError::Transformation(_))));
        // Optimistic 3 was overwritten by server truth 4.
        assert_eq!(manager.displayed_credits().await, Some(4));
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_outcome_also_resyncs() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(2)), Ok(balance(1))];
        let transforms = Arc::new(ScriptedTransformApi::default());
        *transforms.result.lock() =
            Some(Err(ApiError::Timeout(std::time::Duration::from_secs(30))));

        let manager = manager(credits.clone(), transforms);
        manager.refresh().await.unwrap();

        let _ = manager.transform_photo(&sample_request()).await;
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(manager.displayed_credits().await, Some(1));
    }

    #[tokio::test]
    async fn resync_failure_surfaces_as_error_phase_but_keeps_outcome() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() =
            vec![Ok(balance(2)), Err(ApiError::Network("offline".to_string()))];
        let transforms = Arc::new(ScriptedTransformApi::default());
        *transforms.result.lock() = Some(Ok(sample_transformation()));

        let manager = manager(credits, transforms);
        manager.refresh().await.unwrap();

        let result = manager.transform_photo(&sample_request()).await;
        assert!(result.is_ok());
        assert!(matches!(manager.phase().await, CreditPhase::Error(_)));
    }

    #[tokio::test]
    async fn unknown_balance_lets_the_server_adjudicate() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(0))];
        let transforms = Arc::new(ScriptedTransformApi::default());
        *transforms.result.lock() =
            Some(Err(ApiError::InsufficientCredits { required: 1, available: 0 }));

        // No initial fetch: phase is Idle, balance unknown.
        let manager = manager(credits.clone(), transforms.clone());
        let result = manager.transform_photo(&sample_request()).await;

        assert!(matches!(result, Err(ApiError::InsufficientCredits { .. })));
        assert_eq!(transforms.calls.load(Ordering::SeqCst), 1);
        // The attempt still ends with a resync.
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_prompt_fails_before_decrement_and_resync() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(5))];
        let transforms = Arc::new(ScriptedTransformApi::default());

        let manager = manager(credits.clone(), transforms.clone());
        manager.refresh().await.unwrap();

        let mut request = sample_request();
        request.custom_prompt = Some("p".repeat(201));

        let result = manager.transform_photo(&request).await;
        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(manager.displayed_credits().await, Some(5));
        assert_eq!(transforms.calls.load(Ordering::SeqCst), 0);
        assert_eq!(credits.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn purchase_resyncs_to_server_truth() {
        let credits = Arc::new(ScriptedCreditsApi::default());
        *credits.balances.lock() = vec![Ok(balance(0)), Ok(balance(10))];
        *credits.purchase_result.lock() = Some(Ok(PurchaseResult {
            photo_credits: 10,
            transaction_id: Some("txn-1".to_string()),
        }));
        let transforms = Arc::new(ScriptedTransformApi::default());

        let manager = manager(credits, transforms);
        manager.refresh().await.unwrap();

        let purchase = PurchaseRequest {
            package_id: "pack_10".to_string(),
            receipt: "receipt-data".to_string(),
        };
        let result = manager.purchase_credits(&purchase).await.unwrap();
        assert_eq!(result.photo_credits, 10);
        assert_eq!(manager.displayed_credits().await, Some(10));
    }
}
