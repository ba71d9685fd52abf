//! Remote cart service gateway.
//!
//! Translates cart intents into remote calls and responses into [`Cart`]
//! values. Gateways hold no cart state of their own; the synchronizer decides
//! what to send and what to keep.
//!
//! Every mutating call carries the version the client last saw. The service
//! answers a stale version with `409 Conflict`.

mod http;
mod memory;
pub mod wire;

pub use http::HttpCartGateway;
pub use memory::{GatewayCall, InMemoryCartGateway};

use async_trait::async_trait;
use storefront_cart_core::{Cart, CartVersion, ProductId};

use crate::error::GatewayError;

/// Typed access to the remote cart.
#[async_trait]
pub trait CartGateway: Send + Sync {
    /// `GET /cart`
    async fn fetch_cart(&self) -> Result<Cart, GatewayError>;

    /// `POST /cart/items`: add `quantity` units, merging with an existing line.
    async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError>;

    /// `POST /cart/items/{productId}`: set an absolute quantity.
    async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError>;

    /// `DELETE /cart/items/{productId}`
    async fn remove_item(
        &self,
        product_id: &ProductId,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError>;

    /// `POST /cart/clear`
    async fn clear(&self, expected_version: Option<CartVersion>) -> Result<Cart, GatewayError>;
}
