//! Payment session service.
//!
//! A checkout request carries an immutable snapshot of the cart lines. The
//! service answers with a hosted payment page URL; the shopper comes back
//! through the success or cancel URL.

mod http;
mod memory;

pub use http::HttpPaymentGateway;
pub use memory::InMemoryPaymentGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_cart_core::{Cart, MinorUnits, OrderId, ProductId, SessionId};
use url::Url;

use crate::error::GatewayError;

/// Creates hosted payment sessions.
///
/// Implementations must not retry on their own: a retried creation can leave
/// the shopper with two sessions.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `POST /checkout`
    async fn create_session(&self, request: &CheckoutRequest)
    -> Result<PaymentSession, GatewayError>;
}

/// One line of a checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price_minor_units: MinorUnits,
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<Url>,
}

impl CheckoutRequest {
    /// Snapshot the lines of a cart.
    #[must_use]
    pub fn from_cart(cart: &Cart) -> Self {
        Self {
            items: cart
                .items
                .iter()
                .map(|line| CheckoutItem {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    unit_price_minor_units: line.unit_price,
                })
                .collect(),
            success_url: None,
            cancel_url: None,
        }
    }

    /// Attach the return URLs for the hosted payment page.
    #[must_use]
    pub fn with_return_urls(mut self, success_url: Option<Url>, cancel_url: Option<Url>) -> Self {
        self.success_url = success_url;
        self.cancel_url = cancel_url;
        self
    }

    /// Amount the shopper will be charged.
    #[must_use]
    pub fn total(&self) -> MinorUnits {
        self.items
            .iter()
            .map(|item| item.unit_price_minor_units.times(item.quantity))
            .sum()
    }
}

/// Response of `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub session_id: SessionId,
    pub checkout_url: Url,
    pub order_id: OrderId,
    /// When the hosted page stops accepting payment.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use storefront_cart_core::{Mutation, ProductRef};

    fn cart() -> Cart {
        let mut cart = Cart::empty();
        cart.apply(&Mutation::Add {
            product: ProductRef::new(ProductId::new("mug"), "Mug", MinorUnits::new(1250)),
            quantity: 2,
        });
        cart.apply(&Mutation::add_one(ProductRef::new(
            ProductId::new("tee"),
            "Tee",
            MinorUnits::new(2000),
        )));
        cart
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = CheckoutRequest::from_cart(&cart()).with_return_urls(
            Some(Url::parse("https://shop.test/checkout/success").unwrap()),
            None,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "items": [
                    {"productId": "mug", "quantity": 2, "unitPriceMinorUnits": 1250},
                    {"productId": "tee", "quantity": 1, "unitPriceMinorUnits": 2000}
                ],
                "successUrl": "https://shop.test/checkout/success"
            })
        );
        assert_eq!(request.total(), MinorUnits::new(4500));
    }

    #[test]
    fn test_session_parses_optional_expiry() {
        let session: PaymentSession = serde_json::from_str(
            r#"{"sessionId": "cs_1", "checkoutUrl": "https://pay.test/cs_1", "orderId": "42"}"#,
        )
        .unwrap();
        assert_eq!(session.session_id.as_str(), "cs_1");
        assert!(session.expires_at.is_none());
    }
}
