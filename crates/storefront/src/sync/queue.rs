//! Pending mutation queue and net-effect computation.
//!
//! Entries store the absolute local quantity a product should reach, not the
//! delta the shopper tapped. A burst of edits to one product therefore
//! collapses into a single entry, and the request sent for it is computed
//! against the last cart the server confirmed.

use chrono::{DateTime, Utc};
use storefront_cart_core::{Cart, Mutation, ProductId, ProductRef};

/// What kind of intent produced a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Add,
    SetQuantity,
    Remove,
    Clear,
}

/// A local edit the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub kind: MutationKind,
    /// `None` for `Clear`.
    pub product_id: Option<ProductId>,
    /// Target quantity after the edit; 0 for `Remove`, `None` for `Clear`.
    pub quantity: Option<u32>,
    pub submitted_at: DateTime<Utc>,
    pub(crate) seq: u64,
    /// Line details used to show the product before the server has it.
    pub(crate) product: Option<ProductRef>,
}

/// The single gateway request representing an entry's net effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NetRequest {
    Add { product_id: ProductId, quantity: u32 },
    SetQuantity { product_id: ProductId, quantity: u32 },
    Remove { product_id: ProductId },
    Clear,
}

impl NetRequest {
    pub(crate) const fn operation(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add_item",
            Self::SetQuantity { .. } => "set_quantity",
            Self::Remove { .. } => "remove_item",
            Self::Clear => "clear",
        }
    }
}

impl PendingMutation {
    /// Net effect of this entry against the server's confirmed cart.
    ///
    /// Returns `None` when the server already matches the target.
    pub(crate) fn net_effect(&self, confirmed: &Cart) -> Option<NetRequest> {
        let Some(product_id) = self.product_id.clone() else {
            return (!confirmed.is_empty()).then_some(NetRequest::Clear);
        };
        let base = confirmed.quantity_of(&product_id);
        let target = self.quantity.unwrap_or(0);

        if target == base {
            None
        } else if target == 0 {
            Some(NetRequest::Remove { product_id })
        } else if base == 0 {
            Some(NetRequest::Add {
                product_id,
                quantity: target,
            })
        } else if self.kind == MutationKind::Add && target > base {
            Some(NetRequest::Add {
                product_id,
                quantity: target - base,
            })
        } else {
            Some(NetRequest::SetQuantity {
                product_id,
                quantity: target,
            })
        }
    }

    /// The ledger mutation that moves a cart to this entry's target.
    fn replay_onto(&self, cart: &mut Cart) {
        let Some(product_id) = &self.product_id else {
            cart.apply(&Mutation::Clear);
            return;
        };
        let target = self.quantity.unwrap_or(0);
        let mutation = if target == 0 {
            Mutation::Remove {
                product_id: product_id.clone(),
            }
        } else if cart.line(product_id).is_some() {
            Mutation::SetQuantity {
                product_id: product_id.clone(),
                quantity: i64::from(target),
            }
        } else if let Some(product) = &self.product {
            Mutation::Add {
                product: product.clone(),
                quantity: i64::from(target),
            }
        } else {
            return;
        };
        cart.apply(&mutation);
    }
}

fn cart_quantities_differ(a: &Cart, b: &Cart) -> bool {
    a.items.len() != b.items.len()
        || a
            .items
            .iter()
            .any(|line| b.quantity_of(&line.product_id) != line.quantity)
}

/// Pending entries ordered by latest submission.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: Vec<PendingMutation>,
    next_seq: u64,
}

impl PendingQueue {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> &[PendingMutation] {
        &self.entries
    }

    /// The entry to send next. A `Clear` is always first when present.
    pub(crate) fn front(&self) -> Option<&PendingMutation> {
        self.entries.first()
    }

    /// Record that the local cart was cleared. Earlier entries are dropped.
    pub(crate) fn push_clear(&mut self, at: DateTime<Utc>) -> u64 {
        self.entries.clear();
        self.push_entry(MutationKind::Clear, None, None, None, at)
    }

    /// Record a product's new local target, superseding any older entry.
    pub(crate) fn push_product(
        &mut self,
        kind: MutationKind,
        product_id: ProductId,
        target: u32,
        product: Option<ProductRef>,
        at: DateTime<Utc>,
    ) -> u64 {
        let mut template = product;
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.product_id.as_ref() == Some(&product_id))
        {
            let previous = self.entries.remove(index);
            // The line may not exist on the server yet.
            template = template.or(previous.product);
        }
        self.push_entry(kind, Some(product_id), Some(target), template, at)
    }

    fn push_entry(
        &mut self,
        kind: MutationKind,
        product_id: Option<ProductId>,
        quantity: Option<u32>,
        product: Option<ProductRef>,
        at: DateTime<Utc>,
    ) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.entries.push(PendingMutation {
            kind,
            product_id,
            quantity,
            submitted_at: at,
            seq,
            product,
        });
        seq
    }

    /// Drop the entry with `seq`. Returns false if a newer edit replaced it.
    pub(crate) fn resolve(&mut self, seq: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.seq != seq);
        self.entries.len() != before
    }

    /// Last-writer-wins per product after a refetch.
    ///
    /// An entry is discarded only when the server's quantity for its product
    /// moved away from `previous` (the last confirmed cart) in a write stamped
    /// at or after the entry. A server-side clear counts as moving every
    /// product. A pending `Clear` is discarded when any server line moved.
    /// Unknown server time keeps everything.
    pub(crate) fn discard_overridden(&mut self, previous: &Cart, server: &Cart) -> usize {
        let Some(server_time) = server.updated_at else {
            return 0;
        };
        let cleared_remotely = server.is_empty() && !previous.is_empty();
        let before = self.entries.len();
        self.entries.retain(|entry| {
            if entry.submitted_at > server_time {
                return true;
            }
            let moved = match &entry.product_id {
                Some(product_id) => {
                    cleared_remotely
                        || previous.quantity_of(product_id) != server.quantity_of(product_id)
                }
                None => cart_quantities_differ(previous, server),
            };
            !moved
        });
        before - self.entries.len()
    }

    /// The confirmed cart with every pending entry applied on top.
    pub(crate) fn replay(&self, confirmed: &Cart) -> Cart {
        let mut cart = confirmed.clone();
        for entry in &self.entries {
            entry.replay_onto(&mut cart);
        }
        cart
    }
}
