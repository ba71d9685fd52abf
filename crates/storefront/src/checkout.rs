//! Checkout session lifecycle.
//!
//! ```text
//! NoSession ──begin──► Creating ──► Pending ──┬──► Succeeded
//!     ▲                   │                   ├──► Canceled
//!     │                   │ (error)           └──► Failed (expired)
//!     └───────────────────┴──────── reset ◄──────────┘
//! ```
//!
//! A session captures an immutable snapshot of the synchronized cart. The
//! cart stays editable while the shopper is on the payment page; later edits
//! do not change the session. Session creation is never retried.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use storefront_cart_core::{
    CartVersion, CheckoutStatus, LineItem, MinorUnits, OrderId, SessionId, SyncState,
};
use tracing::{info, instrument, warn};
use url::Url;

use crate::auth::CredentialProvider;
use crate::config::PaymentApiConfig;
use crate::error::{CheckoutError, GatewayError, Result, add_breadcrumb, capture_failure};
use crate::payment::{CheckoutRequest, PaymentGateway};
use crate::sync::CartSynchronizer;

/// How the shopper came back from the hosted payment page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Succeeded,
    Canceled,
}

impl From<CheckoutOutcome> for CheckoutStatus {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome {
            CheckoutOutcome::Succeeded => Self::Succeeded,
            CheckoutOutcome::Canceled => Self::Canceled,
        }
    }
}

/// Parameters of a return from the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReturn {
    pub outcome: CheckoutOutcome,
    pub session_id: Option<SessionId>,
    pub order_id: Option<OrderId>,
}

impl CheckoutReturn {
    /// Read `session_id`/`sessionId` and `order_id`/`orderId` from a return URL.
    #[must_use]
    pub fn from_url(outcome: CheckoutOutcome, url: &Url) -> Self {
        let mut session_id = None;
        let mut order_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "session_id" | "sessionId" => session_id = SessionId::parse(&value).ok(),
                "order_id" | "orderId" => order_id = OrderId::parse(&value).ok(),
                _ => {}
            }
        }
        Self {
            outcome,
            session_id,
            order_id,
        }
    }
}

/// A payment session and the cart snapshot it charges for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: SessionId,
    pub status: CheckoutStatus,
    /// Version of the cart the snapshot was taken from.
    pub cart_snapshot_version: CartVersion,
    pub checkout_url: Url,
    pub order_id: OrderId,
    pub items: Vec<LineItem>,
    pub total: MinorUnits,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CheckoutSession {
    /// Returns true if the payment page has stopped accepting payment.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    NoSession,
    Creating,
    Pending(CheckoutSession),
    Terminal(CheckoutSession),
}

impl SessionState {
    /// A pending session past its expiry becomes `Failed`.
    fn expire_if_due(&mut self, now: DateTime<Utc>) {
        if let Self::Pending(session) = self
            && session.is_expired(now)
        {
            info!(session_id = %session.session_id, "Checkout session expired");
            let mut session = session.clone();
            session.status = CheckoutStatus::Failed;
            *self = Self::Terminal(session);
        }
    }
}

// =============================================================================
// CheckoutSessionManager
// =============================================================================

/// Turns a synchronized cart into a payment session and tracks its outcome.
///
/// At most one session is pending at a time.
pub struct CheckoutSessionManager {
    synchronizer: Arc<CartSynchronizer>,
    payments: Arc<dyn PaymentGateway>,
    credentials: Arc<dyn CredentialProvider>,
    config: PaymentApiConfig,
    state: Mutex<SessionState>,
}

impl CheckoutSessionManager {
    #[must_use]
    pub fn new(
        synchronizer: Arc<CartSynchronizer>,
        payments: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialProvider>,
        config: PaymentApiConfig,
    ) -> Self {
        Self {
            synchronizer,
            payments,
            credentials,
            config,
            state: Mutex::new(SessionState::NoSession),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.expire_if_due(Utc::now());
        state
    }

    /// The synchronizer this manager reads carts from.
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<CartSynchronizer> {
        &self.synchronizer
    }

    /// Where the payment page returns after an abandoned payment.
    #[must_use]
    pub const fn cancel_url(&self) -> Option<&Url> {
        self.config.cancel_url.as_ref()
    }

    /// Create a payment session for the current cart and return the hosted
    /// payment page URL.
    ///
    /// Pending edits are flushed first so the snapshot carries server prices.
    /// Starting over from a finished session resets it.
    ///
    /// # Errors
    ///
    /// - `SessionAlreadyPending` if a session is being created or awaits payment
    /// - `EmptyCart` if the synchronized cart has no lines
    /// - `CheckoutInitiationFailed` if the cart could not be synchronized or the
    ///   payment service failed; the cart stays editable
    #[instrument(skip(self))]
    pub async fn begin_checkout(&self) -> Result<Url> {
        add_breadcrumb("checkout", "Begin checkout", None);
        {
            let mut state = self.lock();
            if matches!(*state, SessionState::Creating | SessionState::Pending(_)) {
                return Err(CheckoutError::SessionAlreadyPending);
            }
            *state = SessionState::Creating;
        }

        let result = self.create_session().await;

        let mut state = self.lock();
        match result {
            Ok(session) => {
                let checkout_url = session.checkout_url.clone();
                *state = SessionState::Pending(session);
                Ok(checkout_url)
            }
            Err(err) => {
                *state = SessionState::NoSession;
                Err(err)
            }
        }
    }

    async fn create_session(&self) -> Result<CheckoutSession> {
        // An emptied cart fails before its pending edits reach the network.
        if self.synchronizer.current_cart().is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let snapshot = self.synchronizer.flush().await;
        if snapshot.state == SyncState::Error {
            let err = snapshot.last_error.unwrap_or_else(|| {
                GatewayError::NetworkUnavailable("cart is not synchronized".to_string())
            });
            warn!(error = %err, "Checkout blocked by unsynchronized cart");
            return Err(CheckoutError::CheckoutInitiationFailed(err));
        }
        if snapshot.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if !self.credentials.is_valid() {
            self.credentials.request_refresh();
            return Err(CheckoutError::CheckoutInitiationFailed(
                GatewayError::NotAuthenticated,
            ));
        }

        let request = CheckoutRequest::from_cart(&snapshot.cart).with_return_urls(
            self.config.success_url.clone(),
            self.config.cancel_url.clone(),
        );
        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.payments.create_session(&request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(GatewayError::NetworkUnavailable(
                "create_session timed out".to_string(),
            ))
        });

        match result {
            Ok(payment) => {
                info!(
                    session_id = %payment.session_id,
                    order_id = %payment.order_id,
                    total = snapshot.total.as_i64(),
                    "Checkout session created"
                );
                add_breadcrumb(
                    "checkout",
                    "Session created",
                    Some(&[("session_id", payment.session_id.as_str())]),
                );
                Ok(CheckoutSession {
                    session_id: payment.session_id,
                    status: CheckoutStatus::Pending,
                    cart_snapshot_version: snapshot.cart.version,
                    checkout_url: payment.checkout_url,
                    order_id: payment.order_id,
                    items: snapshot.cart.items,
                    total: snapshot.total,
                    created_at: Utc::now(),
                    expires_at: payment.expires_at,
                })
            }
            Err(err) => {
                if err == GatewayError::NotAuthenticated {
                    self.credentials.request_refresh();
                }
                capture_failure("checkout", &err);
                Err(CheckoutError::CheckoutInitiationFailed(err))
            }
        }
    }

    /// The pending or most recently finished session.
    #[must_use]
    pub fn current_session(&self) -> Option<CheckoutSession> {
        match &*self.lock() {
            SessionState::Pending(session) | SessionState::Terminal(session) => {
                Some(session.clone())
            }
            SessionState::NoSession | SessionState::Creating => None,
        }
    }

    /// Record the outcome of the pending session and refetch the cart.
    ///
    /// The server may or may not have cleared the cart, so it is always
    /// refetched. A failed refetch leaves the synchronizer in `Error` but does
    /// not fail the return.
    ///
    /// # Errors
    ///
    /// Returns `NoPendingSession` if no session awaits payment.
    #[instrument(skip(self))]
    pub async fn resolve_return(&self, outcome: CheckoutOutcome) -> Result<CheckoutSession> {
        let result = self.finish(outcome, None);
        self.resync().await;
        result
    }

    /// Like [`resolve_return`](Self::resolve_return), checking that the return
    /// names the pending session.
    ///
    /// # Errors
    ///
    /// Returns `SessionMismatch` if the return carries a different session id,
    /// or `NoPendingSession` if no session awaits payment.
    #[instrument(skip(self), fields(session_id = ?checkout_return.session_id))]
    pub async fn resolve_return_with(
        &self,
        checkout_return: &CheckoutReturn,
    ) -> Result<CheckoutSession> {
        let result = self.finish(
            checkout_return.outcome,
            checkout_return.session_id.as_ref(),
        );
        self.resync().await;
        result
    }

    fn finish(
        &self,
        outcome: CheckoutOutcome,
        session_id: Option<&SessionId>,
    ) -> Result<CheckoutSession> {
        let mut state = self.lock();
        let SessionState::Pending(session) = &*state else {
            return Err(CheckoutError::NoPendingSession);
        };
        if let Some(received) = session_id
            && received != &session.session_id
        {
            return Err(CheckoutError::SessionMismatch {
                expected: session.session_id.clone(),
                received: received.clone(),
            });
        }

        let mut session = session.clone();
        session.status = outcome.into();
        info!(
            session_id = %session.session_id,
            status = %session.status,
            "Checkout session resolved"
        );
        add_breadcrumb(
            "checkout",
            "Session resolved",
            Some(&[
                ("session_id", session.session_id.as_str()),
                ("status", session.status.to_string().as_str()),
            ]),
        );
        *state = SessionState::Terminal(session.clone());
        Ok(session)
    }

    async fn resync(&self) {
        if let Err(err) = self.synchronizer.sync_cart().await {
            warn!(error = %err, "Cart refetch after checkout return failed");
        }
    }

    /// Return a finished session to `NoSession`.
    ///
    /// Returns false if a session is still pending or being created.
    pub fn reset(&self) -> bool {
        let mut state = self.lock();
        match *state {
            SessionState::Terminal(_) => {
                *state = SessionState::NoSession;
                true
            }
            SessionState::NoSession => true,
            SessionState::Creating | SessionState::Pending(_) => false,
        }
    }
}

impl std::fmt::Debug for CheckoutSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSessionManager")
            .field("session", &self.current_session())
            .finish_non_exhaustive()
    }
}
