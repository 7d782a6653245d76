//! Auth session state machine
//!
//! Tracks the sign-in/out/refresh lifecycle as a tagged phase plus a pure
//! transition function. [`SessionManager`] drives the machine against a
//! [`SessionApi`] implementation: it probes the stored token at startup,
//! runs sign-in/refresh, and guarantees sign-out always lands in
//! `SignedOut` even when the store or network misbehaves.

use std::sync::Arc;

use snapfig_domain::{AppleIdentity, ErrorCategory, Result, UserProfile};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::ports::SessionApi;

/// Session lifecycle phase
///
/// `user` and token travel together inside `SignedIn`; there is no state in
/// which one is set without the other. `Error` is a signed-out phase carrying
/// the message of the last failed attempt.
#[derive(Debug, Clone)]
pub enum SessionPhase {
    Loading,
    SignedOut,
    SignedIn { user: UserProfile, token: String },
    Error(String),
}

impl SessionPhase {
    /// Whether a user is currently signed in
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Self::SignedIn { .. })
    }
}

/// Events fed to the session transition function
#[derive(Debug, Clone)]
pub enum SessionEvent {
    AttemptStarted,
    ProbeSucceeded { user: UserProfile, token: String },
    ProbeFailed,
    SignInSucceeded { user: UserProfile, token: String },
    SignInFailed(String),
    RefreshSucceeded { user: UserProfile, token: String },
    RefreshRejected,
    SignedOut,
}

/// Pure transition function for the session machine
///
/// Every event fully determines the next phase, so the machine cannot wedge
/// in `Loading` regardless of the phase an attempt started from.
#[must_use]
pub fn transition(_phase: &SessionPhase, event: SessionEvent) -> SessionPhase {
    match event {
        SessionEvent::AttemptStarted => SessionPhase::Loading,
        SessionEvent::ProbeSucceeded { user, token }
        | SessionEvent::SignInSucceeded { user, token }
        | SessionEvent::RefreshSucceeded { user, token } => SessionPhase::SignedIn { user, token },
        SessionEvent::ProbeFailed | SessionEvent::RefreshRejected | SessionEvent::SignedOut => {
            SessionPhase::SignedOut
        }
        // A signed-out phase carrying the failure message; the caller stays
        // signed out underneath it.
        SessionEvent::SignInFailed(message) => SessionPhase::Error(message),
    }
}

/// Async driver for the session machine
pub struct SessionManager<A: SessionApi> {
    api: Arc<A>,
    phase: RwLock<SessionPhase>,
}

impl<A: SessionApi> SessionManager<A> {
    /// Create a manager in the `Loading` phase, before the startup probe.
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        Self { api, phase: RwLock::new(SessionPhase::Loading) }
    }

    /// Current phase snapshot
    pub async fn phase(&self) -> SessionPhase {
        self.phase.read().await.clone()
    }

    async fn apply(&self, event: SessionEvent) -> SessionPhase {
        let mut phase = self.phase.write().await;
        *phase = transition(&phase, event);
        phase.clone()
    }

    /// Probe the stored token at app start.
    ///
    /// Resolves `Loading` into `SignedIn` (token present and valid) or
    /// `SignedOut` (absent, rejected, or unverifiable). An auth-rejected
    /// token is also cleared locally; a network failure leaves the token in
    /// place for the next launch.
    pub async fn initialize(&self) -> SessionPhase {
        self.apply(SessionEvent::AttemptStarted).await;

        let token = match self.api.stored_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("no stored session token");
                return self.apply(SessionEvent::ProbeFailed).await;
            }
            Err(err) => {
                warn!(error = %err, "token store unreadable during startup probe");
                return self.apply(SessionEvent::ProbeFailed).await;
            }
        };

        match self.api.validate_session().await {
            Ok(user) => {
                info!("stored session is valid");
                self.apply(SessionEvent::ProbeSucceeded { user, token }).await
            }
            Err(err) => {
                if err.category() == ErrorCategory::Authentication {
                    self.clear_local_session().await;
                }
                debug!(error = %err, "stored session rejected");
                self.apply(SessionEvent::ProbeFailed).await
            }
        }
    }

    /// Run a sign-in attempt.
    ///
    /// # Errors
    /// Propagates the façade error; the phase becomes `Error(message)` and
    /// no token is persisted on failure.
    pub async fn sign_in(&self, identity: &AppleIdentity) -> Result<UserProfile> {
        self.apply(SessionEvent::AttemptStarted).await;

        match self.api.sign_in(identity).await {
            Ok(payload) => {
                info!("sign-in succeeded");
                let user = payload.user.clone();
                self.apply(SessionEvent::SignInSucceeded {
                    user: payload.user,
                    token: payload.token,
                })
                .await;
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "sign-in failed");
                self.apply(SessionEvent::SignInFailed(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Refresh the session token.
    ///
    /// A rejected refresh ends the session: the token is cleared and the
    /// phase becomes `SignedOut`. There is no second attempt.
    ///
    /// # Errors
    /// Propagates the façade error on rejection.
    pub async fn refresh(&self) -> Result<()> {
        self.apply(SessionEvent::AttemptStarted).await;

        match self.api.refresh_session().await {
            Ok(payload) => {
                debug!("session refreshed");
                self.apply(SessionEvent::RefreshSucceeded {
                    user: payload.user,
                    token: payload.token,
                })
                .await;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "refresh rejected, ending session");
                self.clear_local_session().await;
                self.apply(SessionEvent::RefreshRejected).await;
                Err(err)
            }
        }
    }

    /// Sign out.
    ///
    /// Best-effort: store or network failures are logged and ignored so the
    /// local session always ends `SignedOut`.
    pub async fn sign_out(&self) -> SessionPhase {
        self.clear_local_session().await;
        self.apply(SessionEvent::SignedOut).await
    }

    async fn clear_local_session(&self) {
        if let Err(err) = self.api.sign_out().await {
            warn!(error = %err, "local sign-out incomplete, continuing anyway");
        }
    }
}
