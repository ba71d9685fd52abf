//! HTTP client for the remote cart service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, IF_MATCH};
use secrecy::ExposeSecret;
use storefront_cart_core::{Cart, CartVersion, ProductId};
use tracing::instrument;
use url::Url;

use super::CartGateway;
use super::wire::{self, AddItemBody, CartData, SetQuantityBody};
use crate::auth::CredentialProvider;
use crate::config::CartApiConfig;
use crate::error::GatewayError;

// =============================================================================
// HttpCartGateway
// =============================================================================

/// Client for the remote cart REST API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct HttpCartGateway {
    inner: Arc<HttpCartGatewayInner>,
}

struct HttpCartGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpCartGateway {
    /// Create a gateway for the configured cart service.
    #[must_use]
    pub fn new(config: &CartApiConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
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
            inner: Arc::new(HttpCartGatewayInner {
                client,
                base_url,
                credentials,
            }),
        }
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Invalid {
                status: 0,
                message: format!("cart base URL cannot be a base: {}", self.inner.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and decode the cart in the response.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        let credentials = &self.inner.credentials;
        let token = credentials
            .bearer_token()
            .filter(|_| credentials.is_valid())
            .ok_or(GatewayError::NotAuthenticated)?;

        let mut request = request
            .bearer_auth(token.expose_secret())
            .header(ACCEPT, "application/json");
        if let Some(version) = expected_version {
            request = request.header(IF_MATCH, format!("\"{version}\""));
        }

        let response = request.send().await?;
        let status = response.status();

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            let message = wire::error_message(&body);
            tracing::warn!(
                status = %status,
                message = %message,
                "Cart service returned non-success status"
            );
            return Err(GatewayError::from_status(status, message));
        }

        let data: CartData = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse cart response"
            );
            GatewayError::ServerError {
                status: Some(status.as_u16()),
                message: format!("unreadable cart: {e}"),
            }
        })?;

        Ok(wire::convert_cart(data))
    }
}

#[async_trait]
impl CartGateway for HttpCartGateway {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Cart, GatewayError> {
        let url = self.endpoint(&["cart"])?;
        self.execute(self.inner.client.get(url), None).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        let url = self.endpoint(&["cart", "items"])?;
        let body = AddItemBody {
            product_id: product_id.as_str(),
            quantity,
        };
        self.execute(self.inner.client.post(url).json(&body), expected_version)
            .await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()])?;
        self.execute(
            self.inner.client.post(url).json(&SetQuantityBody { quantity }),
            expected_version,
        )
        .await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn remove_item(
        &self,
        product_id: &ProductId,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()])?;
        self.execute(self.inner.client.delete(url), expected_version)
            .await
    }

    #[instrument(skip(self))]
    async fn clear(&self, expected_version: Option<CartVersion>) -> Result<Cart, GatewayError> {
        let url = self.endpoint(&["cart", "clear"])?;
        self.execute(self.inner.client.post(url), expected_version)
            .await
    }
}
