//! In-memory payment session service for testing.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use storefront_cart_core::{OrderId, SessionId};
use url::Url;

use super::{CheckoutRequest, PaymentGateway, PaymentSession};
use crate::error::GatewayError;

const CHECKOUT_PAGE_BASE: &str = "https://pay.invalid/checkout/";

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    requests: Vec<CheckoutRequest>,
    next_id: u32,
    failures: VecDeque<GatewayError>,
    latency: Duration,
    session_ttl: Option<chrono::Duration>,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next session creation with `err`.
    pub fn fail_next(&self, err: GatewayError) {
        self.write().failures.push_back(err);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    /// Give new sessions an expiry `ttl` after creation.
    pub fn set_session_ttl(&self, ttl: chrono::Duration) {
        self.write().session_ttl = Some(ttl);
    }

    /// Number of `create_session` calls received, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.read().requests.len()
    }

    /// Every checkout request received, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.read().requests.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<PaymentSession, GatewayError> {
        let latency = {
            let mut state = self.write();
            state.requests.push(request.clone());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.write();
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }

        state.next_id += 1;
        let session_id = SessionId::new(format!("cs_test_{:04}", state.next_id));
        let checkout_url = Url::parse(CHECKOUT_PAGE_BASE)
            .and_then(|base| base.join(session_id.as_str()))
            .map_err(|e| GatewayError::ServerError {
                status: None,
                message: e.to_string(),
            })?;

        Ok(PaymentSession {
            order_id: OrderId::new(format!("order_{:04}", state.next_id)),
            session_id,
            checkout_url,
            expires_at: state.session_ttl.map(|ttl| Utc::now() + ttl),
        })
    }
}
