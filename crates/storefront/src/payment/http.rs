//! HTTP client for the payment session service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use super::{CheckoutRequest, PaymentGateway, PaymentSession};
use crate::auth::CredentialProvider;
use crate::config::PaymentApiConfig;
use crate::error::GatewayError;
use crate::gateway::wire;

/// Header that lets the service collapse duplicate submissions.
const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Client for the payment session REST API.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    inner: Arc<HttpPaymentGatewayInner>,
}

struct HttpPaymentGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpPaymentGateway {
    /// Create a gateway for the configured payment service.
    #[must_use]
    pub fn new(config: &PaymentApiConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_client(reqwest::Client::new(), config.base_url.clone(), credentials)
    }

    /// Create a gateway with a preconfigured `reqwest` client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(HttpPaymentGatewayInner {
                client,
                base_url,
                credentials,
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(items = request.items.len(), total = %request.total()))]
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<PaymentSession, GatewayError> {
        let credentials = &self.inner.credentials;
        let token = credentials
            .bearer_token()
            .filter(|_| credentials.is_valid())
            .ok_or(GatewayError::NotAuthenticated)?;

        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Invalid {
                status: 0,
                message: format!("payment base URL cannot be a base: {}", self.inner.base_url),
            })?
            .pop_if_empty()
            .push("checkout");

        let idempotency_key = Uuid::new_v4();
        tracing::debug!(%idempotency_key, "Creating payment session");

        let response = self
            .inner
            .client
            .post(url)
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, "application/json")
            .header(IDEMPOTENCY_KEY, idempotency_key.to_string())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = wire::error_message(&body);
            tracing::warn!(
                status = %status,
                message = %message,
                "Payment service returned non-success status"
            );
            return Err(GatewayError::from_status(status, message));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse payment session response"
            );
            GatewayError::ServerError {
                status: Some(status.as_u16()),
                message: format!("unreadable payment session: {e}"),
            }
        })
    }
}
