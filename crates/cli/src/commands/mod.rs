//! CLI command implementations.

pub mod cart;
pub mod checkout;

use std::sync::Arc;

use storefront_cart::auth::{CredentialProvider, StaticCredentials};
use storefront_cart::config::CartClientConfig;
use storefront_cart::gateway::HttpCartGateway;
use storefront_cart::payment::HttpPaymentGateway;
use storefront_cart::{CartSnapshot, CartSynchronizer, CheckoutSessionManager};
use tracing::info;

/// Synchronizer and checkout manager wired to the HTTP services.
pub struct Client {
    pub sync: Arc<CartSynchronizer>,
    pub checkout: CheckoutSessionManager,
}

impl Client {
    /// Build the clients and load the server cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cart cannot be fetched.
    pub async fn connect(config: &CartClientConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(
            config
                .cart_api
                .access_token
                .clone()
                .map_or_else(StaticCredentials::anonymous, StaticCredentials::new),
        );
        let gateway = HttpCartGateway::new(&config.cart_api, credentials.clone());
        let payments = HttpPaymentGateway::new(&config.payment_api, credentials.clone());

        let sync = Arc::new(CartSynchronizer::new(
            Arc::new(gateway),
            credentials.clone(),
            config.sync.clone(),
        ));
        sync.sync_cart().await?;

        let checkout = CheckoutSessionManager::new(
            sync.clone(),
            Arc::new(payments),
            credentials,
            config.payment_api.clone(),
        );
        Ok(Self { sync, checkout })
    }
}

/// Log every line and the total of a snapshot.
pub fn report(snapshot: &CartSnapshot) {
    for line in &snapshot.cart.items {
        info!(
            product_id = %line.product_id,
            name = %line.name,
            quantity = line.quantity,
            line_total = %line.line_total(),
            "Cart line"
        );
    }
    info!(
        version = %snapshot.cart.version,
        items = snapshot.item_count,
        total = %snapshot.total,
        state = %snapshot.state,
        "Cart"
    );
}
