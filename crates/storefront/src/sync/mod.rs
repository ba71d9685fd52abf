//! Cart synchronizer.
//!
//! Owns one shopper's cart. Intents are applied to the local view at once
//! (optimistic update) and recorded in a pending queue; a background driver
//! waits for the debounce window to pass and then sends one gateway call per
//! cycle carrying the net effect of the oldest pending entry.
//!
//! Two carts are kept:
//!
//! - `confirmed` - the last cart the server returned
//! - `local` - `confirmed` with every pending entry replayed on top
//!
//! Every transition publishes a [`CartSnapshot`] on a broadcast channel.
//! At most one gateway call is in flight per synchronizer.

mod queue;
mod retry;

pub use queue::{MutationKind, PendingMutation};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use storefront_cart_core::{
    Cart, CartVersion, MinorUnits, Mutation, ProductId, ProductRef, SyncState,
};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::auth::CredentialProvider;
use crate::config::SyncConfig;
use crate::error::{GatewayError, add_breadcrumb, capture_failure};
use crate::gateway::CartGateway;
use queue::{NetRequest, PendingQueue};

// =============================================================================
// CartSnapshot
// =============================================================================

/// The view published to the presentation layer after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    /// Local cart, including unconfirmed edits.
    pub cart: Cart,
    /// Total of `cart` in minor units.
    pub total: MinorUnits,
    /// Units across all lines.
    pub item_count: u64,
    /// Synchronizer state at the time of the snapshot.
    pub state: SyncState,
    /// Number of unconfirmed entries.
    pub pending: usize,
    /// Set when the server rejected the credential; cleared by the next
    /// successful response.
    pub stale: bool,
    /// Why the synchronizer last entered `Error`.
    pub last_error: Option<GatewayError>,
}

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug, Default)]
struct SyncShared {
    confirmed: Cart,
    local: Cart,
    state: SyncState,
    queue: PendingQueue,
    /// When the driver may start the next cycle; `None` means nothing is
    /// scheduled.
    deadline: Option<Instant>,
    stale: bool,
    last_error: Option<GatewayError>,
    conflicts: u32,
}

impl SyncShared {
    fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            cart: self.local.clone(),
            total: self.local.total(),
            item_count: self.local.item_count(),
            state: self.state,
            pending: self.queue.len(),
            stale: self.stale,
            last_error: self.last_error.clone(),
        }
    }

    fn rebase(&mut self) {
        self.local = self.queue.replay(&self.confirmed);
    }

    /// Settle after the server answered: `Idle` when nothing is left,
    /// otherwise `Dirty` with the next cycle due now unless an intent
    /// already pushed the deadline out.
    fn settle_after_response(&mut self) {
        self.rebase();
        if self.queue.is_empty() {
            self.state = SyncState::Idle;
            self.deadline = None;
            self.conflicts = 0;
        } else {
            self.state = SyncState::Dirty;
            self.deadline.get_or_insert_with(Instant::now);
        }
    }

    fn enter_error(&mut self, err: GatewayError) {
        self.state = SyncState::Error;
        self.deadline = None;
        self.last_error = Some(err);
    }
}

/// A request chosen by `begin_cycle`.
struct Cycle {
    seq: u64,
    request: NetRequest,
    expected_version: CartVersion,
}

struct SyncInner {
    gateway: Arc<dyn CartGateway>,
    credentials: Arc<dyn CredentialProvider>,
    config: SyncConfig,
    shared: Mutex<SyncShared>,
    /// Held for the duration of any gateway exchange.
    flight: tokio::sync::Mutex<()>,
    wake: Notify,
    events: broadcast::Sender<CartSnapshot>,
}

impl SyncInner {
    fn lock(&self) -> MutexGuard<'_, SyncShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` and publish the resulting snapshot.
    ///
    /// Publishing happens under the lock so subscribers see transitions in
    /// the order they were made.
    fn transition(&self, f: impl FnOnce(&mut SyncShared)) -> CartSnapshot {
        let mut shared = self.lock();
        f(&mut shared);
        self.publish(&shared)
    }

    fn publish(&self, shared: &SyncShared) -> CartSnapshot {
        let snapshot = shared.snapshot();
        debug!(
            state = %snapshot.state,
            pending = snapshot.pending,
            total = snapshot.total.as_i64(),
            "Cart transition"
        );
        // No subscribers is fine.
        let _ = self.events.send(snapshot.clone());
        snapshot
    }

    fn next_deadline(&self) -> Option<Instant> {
        let shared = self.lock();
        if shared.queue.is_empty() {
            None
        } else {
            shared.deadline
        }
    }

    /// Pick the next request, resolving entries the server already matches.
    fn begin_cycle(&self) -> Option<Cycle> {
        let mut shared = self.lock();
        match shared.deadline {
            Some(deadline) if deadline <= Instant::now() => {}
            _ => return None,
        }

        let mut resolved_locally = false;
        while let Some(entry) = shared.queue.front() {
            let seq = entry.seq;
            if let Some(request) = entry.net_effect(&shared.confirmed) {
                let expected_version = shared.confirmed.version;
                shared.state = SyncState::Syncing;
                shared.deadline = None;
                self.publish(&shared);
                return Some(Cycle {
                    seq,
                    request,
                    expected_version,
                });
            }
            shared.queue.resolve(seq);
            resolved_locally = true;
        }

        shared.deadline = None;
        if resolved_locally {
            shared.settle_after_response();
            self.publish(&shared);
        }
        None
    }

    async fn send(
        &self,
        request: &NetRequest,
        expected_version: CartVersion,
    ) -> Result<Cart, GatewayError> {
        let version = Some(expected_version);
        match request {
            NetRequest::Add {
                product_id,
                quantity,
            } => self.gateway.add_item(product_id, *quantity, version).await,
            NetRequest::SetQuantity {
                product_id,
                quantity,
            } => {
                self.gateway
                    .set_quantity(product_id, *quantity, version)
                    .await
            }
            NetRequest::Remove { product_id } => {
                self.gateway.remove_item(product_id, version).await
            }
            NetRequest::Clear => self.gateway.clear(version).await,
        }
    }

    async fn fetch_with_retry(&self) -> Result<Cart, GatewayError> {
        retry::with_backoff(&self.config, "fetch_cart", || self.gateway.fetch_cart()).await
    }

    /// One debounce cycle: send a single net-effect request and reconcile.
    async fn run_cycle(&self) {
        let _flight = self.flight.lock().await;
        let Some(cycle) = self.begin_cycle() else {
            return;
        };

        let operation = cycle.request.operation();
        debug!(operation, expected_version = %cycle.expected_version, "Sending cart request");
        let result = retry::with_backoff(&self.config, operation, || {
            self.send(&cycle.request, cycle.expected_version)
        })
        .await;

        match result {
            Ok(server) => {
                self.transition(|s| {
                    s.confirmed = server;
                    s.queue.resolve(cycle.seq);
                    s.stale = false;
                    s.last_error = None;
                    s.conflicts = 0;
                    s.settle_after_response();
                });
            }
            Err(GatewayError::Conflict) => self.heal_conflict().await,
            Err(err @ GatewayError::Invalid { .. }) => {
                warn!(operation, error = %err, "Cart service rejected edit, dropping it");
                capture_failure("cart_sync", &err);
                self.transition(|s| {
                    s.queue.resolve(cycle.seq);
                    s.rebase();
                    s.enter_error(err);
                });
            }
            Err(err) => self.fail(err),
        }
    }

    /// Refetch after a version conflict. Edits to products the server did not
    /// change, or changed before the edit, are replayed.
    async fn heal_conflict(&self) {
        let exhausted = {
            let mut shared = self.lock();
            shared.conflicts += 1;
            shared.conflicts > self.config.max_conflicts
        };
        if exhausted {
            warn!(
                max_conflicts = self.config.max_conflicts,
                "Cart kept conflicting, giving up"
            );
            capture_failure("cart_sync", &GatewayError::Conflict);
            self.transition(|s| {
                s.conflicts = 0;
                s.enter_error(GatewayError::Conflict);
            });
            return;
        }

        warn!("Cart version conflict, refetching");
        match self.fetch_with_retry().await {
            Ok(server) => {
                self.transition(|s| {
                    let dropped = s.queue.discard_overridden(&s.confirmed, &server);
                    if dropped > 0 {
                        debug!(dropped, "Server write is newer than local edits");
                    }
                    s.confirmed = server;
                    s.stale = false;
                    s.last_error = None;
                    s.settle_after_response();
                });
            }
            Err(err) => self.fail(err),
        }
    }

    /// Enter `Error` keeping the local view and every pending entry.
    fn fail(&self, err: GatewayError) {
        if err == GatewayError::NotAuthenticated {
            warn!("Cart service rejected the credential");
            self.transition(|s| {
                s.stale = true;
                s.enter_error(err);
            });
            self.credentials.request_refresh();
        } else {
            capture_failure("cart_sync", &err);
            self.transition(|s| s.enter_error(err));
        }
    }
}

async fn drive(inner: Arc<SyncInner>) {
    loop {
        match inner.next_deadline() {
            None => inner.wake.notified().await,
            Some(deadline) => {
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => inner.run_cycle().await,
                    () = inner.wake.notified() => {}
                }
            }
        }
    }
}

// =============================================================================
// CartSynchronizer
// =============================================================================

/// One cart's synchronizer. Create one per cart and share it by reference.
///
/// Dropping it stops the background driver; edits still pending are lost.
pub struct CartSynchronizer {
    inner: Arc<SyncInner>,
    driver: JoinHandle<()>,
}

impl CartSynchronizer {
    /// Start a synchronizer with an empty local cart.
    ///
    /// Call [`sync_cart`](Self::sync_cart) to load the server's cart.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn CartGateway>,
        credentials: Arc<dyn CredentialProvider>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(SyncInner {
            gateway,
            credentials,
            config,
            shared: Mutex::new(SyncShared::default()),
            flight: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            events,
        });
        let driver = tokio::spawn(drive(Arc::clone(&inner)));
        Self { inner, driver }
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Add `quantity` units of a product (1 for a single tap).
    pub fn add_item(&self, product: ProductRef, quantity: i64) -> CartSnapshot {
        add_breadcrumb(
            "cart",
            "Add item",
            Some(&[
                ("product_id", product.product_id.as_str()),
                ("quantity", quantity.to_string().as_str()),
            ]),
        );
        self.intent(&Mutation::Add { product, quantity })
    }

    /// Set a product's quantity. Values below 1 remove the line.
    pub fn set_quantity(&self, product_id: ProductId, quantity: i64) -> CartSnapshot {
        add_breadcrumb(
            "cart",
            "Set quantity",
            Some(&[
                ("product_id", product_id.as_str()),
                ("quantity", quantity.to_string().as_str()),
            ]),
        );
        self.intent(&Mutation::SetQuantity {
            product_id,
            quantity,
        })
    }

    /// Remove a product's line.
    pub fn remove_item(&self, product_id: ProductId) -> CartSnapshot {
        add_breadcrumb(
            "cart",
            "Remove item",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.intent(&Mutation::Remove { product_id })
    }

    /// Remove every line.
    pub fn clear(&self) -> CartSnapshot {
        add_breadcrumb("cart", "Clear cart", None);
        self.intent(&Mutation::Clear)
    }

    fn intent(&self, mutation: &Mutation) -> CartSnapshot {
        let inner = &self.inner;
        let snapshot = {
            let mut shared = inner.lock();
            let before = shared.local.clone();
            shared.local.apply(mutation);
            if shared.local == before {
                return shared.snapshot();
            }
            record_pending(&mut shared, mutation);
            // An in-flight request keeps reporting `Syncing` until it resolves.
            if shared.state != SyncState::Syncing {
                shared.state = SyncState::Dirty;
            }
            shared.deadline = Some(Instant::now() + inner.config.debounce);
            inner.publish(&shared)
        };
        inner.wake.notify_one();
        snapshot
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The current view.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.lock().snapshot()
    }

    /// The local cart including unconfirmed edits.
    #[must_use]
    pub fn current_cart(&self) -> Cart {
        self.inner.lock().local.clone()
    }

    /// Total of the local cart, recomputed after every transition.
    #[must_use]
    pub fn total_minor_units(&self) -> MinorUnits {
        self.inner.lock().local.total()
    }

    /// The current synchronizer state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// Unconfirmed edits, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.inner.lock().queue.entries().to_vec()
    }

    /// Receive a snapshot after every transition.
    ///
    /// A subscriber that falls more than `event_capacity` snapshots behind
    /// skips to the newest ones.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartSnapshot> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Wait until nothing is in flight or scheduled (`Idle` or `Error`).
    pub async fn settled(&self) -> CartSnapshot {
        let mut events = self.subscribe();
        loop {
            let snapshot = self.snapshot();
            if snapshot.state.is_settled() {
                return snapshot;
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return self.snapshot(),
            }
        }
    }

    /// Send pending edits now, skipping the debounce window, and wait for the
    /// outcome. Edits left over from an earlier failure are retried.
    pub async fn flush(&self) -> CartSnapshot {
        let scheduled = {
            let shared = self.inner.lock();
            !shared.queue.is_empty()
        };
        if scheduled {
            self.inner.transition(|s| {
                s.deadline = Some(Instant::now());
                if s.state.is_settled() {
                    s.state = SyncState::Dirty;
                }
            });
            self.inner.wake.notify_one();
        }
        self.settled().await
    }

    /// Fetch the server's cart regardless of state.
    ///
    /// With nothing pending the fetched cart replaces the local view. Pending
    /// edits are replayed on top unless the server changed the same product in
    /// a later write (last writer wins per product).
    ///
    /// # Errors
    ///
    /// Returns the gateway error once retries are exhausted. The synchronizer
    /// is then in `Error` with its local view intact.
    #[instrument(skip(self))]
    pub async fn sync_cart(&self) -> Result<CartSnapshot, GatewayError> {
        let inner = &self.inner;
        let _flight = inner.flight.lock().await;
        inner.transition(|s| s.state = SyncState::Syncing);

        match inner.fetch_with_retry().await {
            Ok(server) => {
                let snapshot = inner.transition(|s| {
                    s.queue.discard_overridden(&s.confirmed, &server);
                    s.confirmed = server;
                    s.stale = false;
                    s.last_error = None;
                    s.conflicts = 0;
                    s.settle_after_response();
                });
                if snapshot.pending > 0 {
                    inner.wake.notify_one();
                }
                info!(
                    items = snapshot.cart.items.len(),
                    version = %snapshot.cart.version,
                    pending = snapshot.pending,
                    "Cart synced"
                );
                Ok(snapshot)
            }
            Err(err) => {
                inner.fail(err.clone());
                Err(err)
            }
        }
    }
}

impl Drop for CartSynchronizer {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for CartSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSynchronizer")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

/// Queue the entry for an intent that changed the local cart.
fn record_pending(shared: &mut SyncShared, mutation: &Mutation) {
    let now = Utc::now();
    match mutation {
        Mutation::Clear => {
            shared.queue.push_clear(now);
        }
        Mutation::Add { product, .. } => {
            let target = shared.local.quantity_of(&product.product_id);
            shared.queue.push_product(
                MutationKind::Add,
                product.product_id.clone(),
                target,
                Some(product.clone()),
                now,
            );
        }
        Mutation::SetQuantity { product_id, .. } => {
            let line = shared.local.line(product_id);
            let target = line.map_or(0, |l| l.quantity);
            let template = line.map(storefront_cart_core::LineItem::product);
            let kind = if target == 0 {
                MutationKind::Remove
            } else {
                MutationKind::SetQuantity
            };
            shared
                .queue
                .push_product(kind, product_id.clone(), target, template, now);
        }
        Mutation::Remove { product_id } => {
            shared
                .queue
                .push_product(MutationKind::Remove, product_id.clone(), 0, None, now);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use secrecy::SecretString;

    use crate::auth::StaticCredentials;
    use crate::gateway::{GatewayCall, InMemoryCartGateway};

    fn mug() -> ProductRef {
        ProductRef::new(ProductId::new("mug"), "Mug", MinorUnits::new(500))
    }

    fn tee() -> ProductRef {
        ProductRef::new(ProductId::new("tee"), "Tee", MinorUnits::new(2000))
    }

    fn setup_with(
        gateway: &InMemoryCartGateway,
        config: SyncConfig,
    ) -> (CartSynchronizer, Arc<StaticCredentials>) {
        let creds = Arc::new(StaticCredentials::new(SecretString::from("tok_test_123")));
        let sync = CartSynchronizer::new(Arc::new(gateway.clone()), creds.clone(), config);
        (sync, creds)
    }

    fn setup(gateway: &InMemoryCartGateway) -> CartSynchronizer {
        setup_with(gateway, SyncConfig::default()).0
    }

    #[tokio::test(start_paused = true)]
    async fn test_intent_updates_local_view_immediately() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        let sync = setup(&gateway);

        let snapshot = sync.add_item(mug(), 2);
        assert_eq!(snapshot.state, SyncState::Dirty);
        assert_eq!(snapshot.total, MinorUnits::new(1000));
        assert_eq!(snapshot.pending, 1);
        assert!(gateway.calls().is_empty());

        let settled = sync.settled().await;
        assert_eq!(settled.state, SyncState::Idle);
        assert_eq!(settled.cart.version, CartVersion::new(1));
        assert_eq!(gateway.server_cart().quantity_of(&mug().product_id), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_taps_coalesce_into_one_call() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        let sync = setup(&gateway);

        for _ in 0..5 {
            sync.add_item(mug(), 1);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        sync.settled().await;

        assert_eq!(
            gateway.mutation_calls(),
            vec![GatewayCall::AddItem {
                product_id: mug().product_id,
                quantity: 5,
                expected_version: Some(CartVersion::new(0)),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_taps_on_existing_line_send_the_delta() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.apply_remote(&Mutation::Add {
            product: mug(),
            quantity: 2,
        });
        let sync = setup(&gateway);
        sync.sync_cart().await.unwrap();
        gateway.clear_calls();

        for _ in 0..5 {
            sync.add_item(mug(), 1);
        }
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 7);
        assert_eq!(
            gateway.mutation_calls(),
            vec![GatewayCall::AddItem {
                product_id: mug().product_id,
                quantity: 5,
                expected_version: Some(CartVersion::new(1)),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_then_remove_before_send_is_resolved_locally() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        let sync = setup(&gateway);

        sync.add_item(mug(), 1);
        sync.remove_item(mug().product_id);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Idle);
        assert!(snapshot.cart.is_empty());
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_flight_is_sent_next_cycle() {
        let gateway = InMemoryCartGateway::with_catalog([mug(), tee()]);
        gateway.set_latency(Duration::from_millis(100));
        let sync = setup(&gateway);

        sync.add_item(mug(), 1);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(sync.state(), SyncState::Syncing);

        let during = sync.add_item(tee(), 1);
        assert_eq!(during.state, SyncState::Syncing);
        assert_eq!(during.total, MinorUnits::new(2500));

        let snapshot = sync.settled().await;
        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.total, MinorUnits::new(2500));
        assert_eq!(gateway.mutation_calls().len(), 2);
        assert_eq!(gateway.server_cart().total(), MinorUnits::new(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_optimistic_view() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.set_latency(Duration::from_secs(20));
        let sync = setup(&gateway);

        sync.add_item(mug(), 1);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Error);
        assert_eq!(snapshot.total, MinorUnits::new(500));
        assert_eq!(snapshot.pending, 1);
        assert!(matches!(
            snapshot.last_error,
            Some(GatewayError::NetworkUnavailable(_))
        ));
        assert_eq!(gateway.mutation_calls().len(), 3);

        // The edit is replayed on the next flush.
        gateway.set_latency(Duration::ZERO);
        let snapshot = sync.flush().await;
        assert_eq!(snapshot.state, SyncState::Idle);
        assert!(snapshot.last_error.is_none());
        assert_eq!(gateway.server_cart().quantity_of(&mug().product_id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_authenticated_marks_stale_and_requests_refresh() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.fail_next(GatewayError::NotAuthenticated);
        let (sync, creds) = setup_with(&gateway, SyncConfig::default());

        sync.add_item(mug(), 1);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Error);
        assert!(snapshot.stale);
        assert_eq!(snapshot.pending, 1);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 1);
        assert_eq!(creds.refresh_requests(), 1);
        // Not retried.
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_drops_entry_with_reason() {
        // The service does not sell this product.
        let gateway = InMemoryCartGateway::new();
        let sync = setup(&gateway);

        sync.add_item(mug(), 1);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Error);
        assert!(snapshot.cart.is_empty());
        assert_eq!(snapshot.pending, 0);
        assert!(matches!(
            snapshot.last_error,
            Some(GatewayError::Invalid { status: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_reapplies_edits_newer_than_server() {
        let gateway = InMemoryCartGateway::with_catalog([mug(), tee()]);
        gateway.apply_remote_at(&Mutation::add_one(mug()), Utc::now() - ChronoDuration::seconds(120));
        let sync = setup(&gateway);
        sync.sync_cart().await.unwrap();

        // Another device added a tee a minute ago.
        gateway.apply_remote_at(&Mutation::add_one(tee()), Utc::now() - ChronoDuration::seconds(60));
        gateway.clear_calls();

        sync.set_quantity(mug().product_id, 3);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 3);
        assert_eq!(snapshot.cart.quantity_of(&tee().product_id), 1);
        assert_eq!(snapshot.total, MinorUnits::new(3500));
        assert_eq!(
            gateway.calls(),
            vec![
                GatewayCall::SetQuantity {
                    product_id: mug().product_id,
                    quantity: 3,
                    expected_version: Some(CartVersion::new(1)),
                },
                GatewayCall::FetchCart,
                GatewayCall::SetQuantity {
                    product_id: mug().product_id,
                    quantity: 3,
                    expected_version: Some(CartVersion::new(2)),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_drops_edits_older_than_server() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.apply_remote(&Mutation::add_one(mug()));
        let sync = setup(&gateway);
        sync.sync_cart().await.unwrap();

        // A write stamped after the local edit below.
        gateway.apply_remote_at(
            &Mutation::SetQuantity {
                product_id: mug().product_id,
                quantity: 5,
            },
            Utc::now() + ChronoDuration::seconds(60),
        );

        sync.set_quantity(mug().product_id, 3);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 5);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_edit_to_other_product_keeps_pending_edit() {
        let gateway = InMemoryCartGateway::with_catalog([mug(), tee()]);
        gateway.apply_remote_at(&Mutation::add_one(tee()), Utc::now() - ChronoDuration::seconds(120));
        let sync = setup(&gateway);
        sync.sync_cart().await.unwrap();

        gateway.fail_times(GatewayError::NetworkUnavailable("offline".into()), 3);
        sync.set_quantity(tee().product_id, 3);
        let failed = sync.settled().await;
        assert_eq!(failed.state, SyncState::Error);
        assert_eq!(failed.pending, 1);

        // Another device adds a mug after the tee edit was made.
        gateway.apply_remote_at(&Mutation::add_one(mug()), Utc::now() + ChronoDuration::seconds(30));

        let snapshot = sync.flush().await;
        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.cart.quantity_of(&tee().product_id), 3);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 1);
        assert_eq!(snapshot.pending, 0);
        assert!(snapshot.last_error.is_none());
        assert_eq!(gateway.server_cart().quantity_of(&tee().product_id), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_to_in_flight_product_survives_first_response() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.set_latency(Duration::from_millis(100));
        let sync = setup(&gateway);

        sync.add_item(mug(), 1);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(sync.state(), SyncState::Syncing);

        sync.set_quantity(mug().product_id, 4);
        // The add lands at 400ms; the newer target is still pending.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mid = sync.snapshot();
        assert_eq!(mid.state, SyncState::Dirty);
        assert_eq!(mid.cart.quantity_of(&mug().product_id), 4);

        let snapshot = sync.settled().await;
        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 4);
        assert_eq!(
            gateway.mutation_calls(),
            vec![
                GatewayCall::AddItem {
                    product_id: mug().product_id,
                    quantity: 1,
                    expected_version: Some(CartVersion::new(0)),
                },
                GatewayCall::SetQuantity {
                    product_id: mug().product_id,
                    quantity: 4,
                    expected_version: Some(CartVersion::new(1)),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_beyond_limit_enter_error() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        gateway.fail_next(GatewayError::Conflict);
        let config = SyncConfig {
            max_conflicts: 0,
            ..SyncConfig::default()
        };
        let (sync, _) = setup_with(&gateway, config);

        sync.add_item(mug(), 1);
        let snapshot = sync.settled().await;

        assert_eq!(snapshot.state, SyncState::Error);
        assert_eq!(snapshot.last_error, Some(GatewayError::Conflict));
        assert_eq!(snapshot.pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_each_transition() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        let sync = setup(&gateway);
        let mut events = sync.subscribe();

        sync.add_item(mug(), 1);
        let mut states = Vec::new();
        while states.last() != Some(&SyncState::Idle) {
            states.push(events.recv().await.unwrap().state);
        }

        assert_eq!(
            states,
            vec![SyncState::Dirty, SyncState::Syncing, SyncState::Idle]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_cart_replaces_local_view_when_idle() {
        let gateway = InMemoryCartGateway::with_catalog([mug(), tee()]);
        let sync = setup(&gateway);
        sync.add_item(mug(), 1);
        sync.settled().await;

        gateway.complete_checkout();
        gateway.apply_remote(&Mutation::add_one(tee()));
        let snapshot = sync.sync_cart().await.unwrap();

        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.cart.quantity_of(&mug().product_id), 0);
        assert_eq!(snapshot.cart.quantity_of(&tee().product_id), 1);
        assert_eq!(sync.current_cart(), gateway.server_cart());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_cart_failure_enters_error() {
        let gateway = InMemoryCartGateway::new();
        gateway.fail_times(GatewayError::NetworkUnavailable("offline".into()), 3);
        let sync = setup(&gateway);

        let result = sync.sync_cart().await;
        assert!(matches!(result, Err(GatewayError::NetworkUnavailable(_))));
        assert_eq!(sync.state(), SyncState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_op_intent_does_not_schedule() {
        let gateway = InMemoryCartGateway::new();
        let sync = setup(&gateway);

        let snapshot = sync.set_quantity(ProductId::new("ghost"), 3);
        assert_eq!(snapshot.state, SyncState::Idle);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_driver() {
        let gateway = InMemoryCartGateway::with_catalog([mug()]);
        let sync = setup(&gateway);
        sync.add_item(mug(), 1);
        drop(sync);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(gateway.calls().is_empty());
    }
}
