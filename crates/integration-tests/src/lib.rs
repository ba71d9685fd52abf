//! Integration tests for the storefront cart client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storefront-cart-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `ledger_properties` - Quantity ledger invariants over random edit sequences
//! - `sync_scenarios` - Synchronizer behaviour against the in-memory cart service
//! - `checkout_scenarios` - Checkout sessions end to end
//!
//! Every test runs against the in-memory gateways; no network is needed.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use secrecy::SecretString;
use storefront_cart::auth::StaticCredentials;
use storefront_cart::config::{PaymentApiConfig, SyncConfig};
use storefront_cart::gateway::InMemoryCartGateway;
use storefront_cart::payment::InMemoryPaymentGateway;
use storefront_cart::{CartSynchronizer, CheckoutSessionManager};
use storefront_cart_core::{MinorUnits, ProductId, ProductRef};
use url::Url;

/// A product priced in minor units.
#[must_use]
pub fn product(id: &str, unit_price: i64) -> ProductRef {
    ProductRef::new(ProductId::new(id), id.to_uppercase(), MinorUnits::new(unit_price))
}

/// A synchronizer and checkout manager wired to in-memory services.
pub struct Storefront {
    pub cart_service: InMemoryCartGateway,
    pub payment_service: InMemoryPaymentGateway,
    pub credentials: Arc<StaticCredentials>,
    pub sync: Arc<CartSynchronizer>,
    pub checkout: CheckoutSessionManager,
}

impl Storefront {
    /// Storefront selling `catalog` with the default sync policy.
    #[must_use]
    pub fn new(catalog: impl IntoIterator<Item = ProductRef>) -> Self {
        Self::with_config(catalog, SyncConfig::default())
    }

    /// Storefront selling `catalog` with a custom sync policy.
    ///
    /// # Panics
    ///
    /// Panics if the fixed payment base URL fails to parse.
    #[must_use]
    pub fn with_config(catalog: impl IntoIterator<Item = ProductRef>, config: SyncConfig) -> Self {
        let cart_service = InMemoryCartGateway::with_catalog(catalog);
        let payment_service = InMemoryPaymentGateway::new();
        let credentials = Arc::new(StaticCredentials::new(SecretString::from(
            "tok_integration_7Qz",
        )));
        let sync = Arc::new(CartSynchronizer::new(
            Arc::new(cart_service.clone()),
            credentials.clone(),
            config,
        ));
        let payment_config =
            PaymentApiConfig::new(Url::parse("https://pay.test/").expect("valid payment URL"));
        let checkout = CheckoutSessionManager::new(
            sync.clone(),
            Arc::new(payment_service.clone()),
            credentials.clone(),
            payment_config,
        );
        Self {
            cart_service,
            payment_service,
            credentials,
            sync,
            checkout,
        }
    }
}
