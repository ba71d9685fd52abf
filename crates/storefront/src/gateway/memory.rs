//! In-memory cart service for tests and local development.
//!
//! Behaves like the remote service: prices come from a catalog, every write
//! bumps the version and stamps `updated_at`, and a stale expected version is
//! rejected with `Conflict`. Failures and latency can be scripted.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storefront_cart_core::{Cart, CartVersion, Mutation, ProductId, ProductRef};

use super::CartGateway;
use crate::error::GatewayError;

/// A request received by [`InMemoryCartGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    FetchCart,
    AddItem {
        product_id: ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    },
    SetQuantity {
        product_id: ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    },
    RemoveItem {
        product_id: ProductId,
        expected_version: Option<CartVersion>,
    },
    Clear {
        expected_version: Option<CartVersion>,
    },
}

impl GatewayCall {
    /// Returns true for everything except `FetchCart`.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::FetchCart)
    }
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    catalog: HashMap<ProductId, ProductRef>,
    cart: Cart,
    failures: VecDeque<GatewayError>,
    latency: Duration,
    calls: Vec<GatewayCall>,
}

impl InMemoryCartState {
    fn commit(&mut self, mutation: &Mutation, at: DateTime<Utc>) -> Cart {
        self.cart.apply(mutation);
        self.cart.version = self.cart.version.next();
        self.cart.updated_at = Some(at);
        self.cart.clone()
    }

    fn check_version(&self, expected: Option<CartVersion>) -> Result<(), GatewayError> {
        match expected {
            Some(version) if version != self.cart.version => Err(GatewayError::Conflict),
            _ => Ok(()),
        }
    }

    fn handle(&mut self, call: &GatewayCall) -> Result<Cart, GatewayError> {
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }

        let mutation = match call {
            GatewayCall::FetchCart => return Ok(self.cart.clone()),
            GatewayCall::AddItem {
                product_id,
                quantity,
                expected_version,
            } => {
                self.check_version(*expected_version)?;
                if *quantity == 0 {
                    return Err(invalid(400, "Invalid quantity"));
                }
                let product = self
                    .cart
                    .line(product_id)
                    .map(storefront_cart_core::LineItem::product)
                    .or_else(|| self.catalog.get(product_id).cloned())
                    .ok_or_else(|| invalid(404, "Product not found"))?;
                Mutation::Add {
                    product,
                    quantity: i64::from(*quantity),
                }
            }
            GatewayCall::SetQuantity {
                product_id,
                quantity,
                expected_version,
            } => {
                self.check_version(*expected_version)?;
                if self.cart.line(product_id).is_none() {
                    return Err(invalid(404, "Item not in cart"));
                }
                Mutation::SetQuantity {
                    product_id: product_id.clone(),
                    quantity: i64::from(*quantity),
                }
            }
            GatewayCall::RemoveItem {
                product_id,
                expected_version,
            } => {
                self.check_version(*expected_version)?;
                Mutation::Remove {
                    product_id: product_id.clone(),
                }
            }
            GatewayCall::Clear { expected_version } => {
                self.check_version(*expected_version)?;
                Mutation::Clear
            }
        };

        Ok(self.commit(&mutation, Utc::now()))
    }
}

fn invalid(status: u16, message: &str) -> GatewayError {
    GatewayError::Invalid {
        status,
        message: message.to_string(),
    }
}

/// In-memory remote cart.
///
/// Clones share state, so a test can keep a handle while the synchronizer
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartGateway {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartGateway {
    /// Creates an empty service with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service that sells the given products.
    #[must_use]
    pub fn with_catalog(products: impl IntoIterator<Item = ProductRef>) -> Self {
        let gateway = Self::new();
        for product in products {
            gateway.add_to_catalog(product);
        }
        gateway
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryCartState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryCartState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes a product available to `add_item`.
    pub fn add_to_catalog(&self, product: ProductRef) {
        self.write()
            .catalog
            .insert(product.product_id.clone(), product);
    }

    /// The server's current cart.
    #[must_use]
    pub fn server_cart(&self) -> Cart {
        self.read().cart.clone()
    }

    /// Apply a write from another client (e.g., a second device) now.
    pub fn apply_remote(&self, mutation: &Mutation) -> Cart {
        self.apply_remote_at(mutation, Utc::now())
    }

    /// Apply a write from another client with an explicit server timestamp.
    pub fn apply_remote_at(&self, mutation: &Mutation, at: DateTime<Utc>) -> Cart {
        self.write().commit(mutation, at)
    }

    /// Clear the cart the way the service does after a completed payment.
    pub fn complete_checkout(&self) -> Cart {
        self.apply_remote(&Mutation::Clear)
    }

    /// Fail the next request with `err`.
    pub fn fail_next(&self, err: GatewayError) {
        self.fail_times(err, 1);
    }

    /// Fail the next `times` requests with `err`.
    pub fn fail_times(&self, err: GatewayError, times: usize) {
        let mut state = self.write();
        for _ in 0..times {
            state.failures.push_back(err.clone());
        }
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.write().latency = latency;
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.read().calls.clone()
    }

    /// Requests other than `fetch_cart` received so far.
    #[must_use]
    pub fn mutation_calls(&self) -> Vec<GatewayCall> {
        self.read()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear_calls(&self) {
        self.write().calls.clear();
    }

    async fn dispatch(&self, call: GatewayCall) -> Result<Cart, GatewayError> {
        let latency = {
            let mut state = self.write();
            state.calls.push(call.clone());
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.write().handle(&call)
    }
}

#[async_trait]
impl CartGateway for InMemoryCartGateway {
    async fn fetch_cart(&self) -> Result<Cart, GatewayError> {
        self.dispatch(GatewayCall::FetchCart).await
    }

    async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        self.dispatch(GatewayCall::AddItem {
            product_id: product_id.clone(),
            quantity,
            expected_version,
        })
        .await
    }

    async fn set_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        self.dispatch(GatewayCall::SetQuantity {
            product_id: product_id.clone(),
            quantity,
            expected_version,
        })
        .await
    }

    async fn remove_item(
        &self,
        product_id: &ProductId,
        expected_version: Option<CartVersion>,
    ) -> Result<Cart, GatewayError> {
        self.dispatch(GatewayCall::RemoveItem {
            product_id: product_id.clone(),
            expected_version,
        })
        .await
    }

    async fn clear(&self, expected_version: Option<CartVersion>) -> Result<Cart, GatewayError> {
        self.dispatch(GatewayCall::Clear { expected_version }).await
    }
}
