//! Quantity ledger: pure cart mutations.
//!
//! Every function here is synchronous and infallible. Out-of-range input is
//! normalized rather than rejected:
//!
//! - `Add` with a quantity below 1 changes nothing
//! - `SetQuantity` below 1 removes the line
//! - `SetQuantity`/`Remove` for a product not in the cart change nothing
//! - quantities saturate at `u32::MAX`
//!
//! After any sequence of mutations no two lines share a product and every
//! line has a quantity of at least 1.

use crate::types::{Cart, LineItem, MinorUnits, ProductId, ProductRef};

/// A change to a cart requested by the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Increase a product's quantity, appending a new line if absent.
    Add {
        /// The product, used when a new line must be created.
        product: ProductRef,
        /// Units to add.
        quantity: i64,
    },
    /// Set a product's quantity; values below 1 remove the line.
    SetQuantity {
        /// The product to change.
        product_id: ProductId,
        /// Requested quantity.
        quantity: i64,
    },
    /// Remove a product's line.
    Remove {
        /// The product to remove.
        product_id: ProductId,
    },
    /// Remove every line.
    Clear,
}

impl Mutation {
    /// Add one unit of a product.
    #[must_use]
    pub const fn add_one(product: ProductRef) -> Self {
        Self::Add {
            product,
            quantity: 1,
        }
    }

    /// The product this mutation targets, if any.
    #[must_use]
    pub const fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::Add { product, .. } => Some(&product.product_id),
            Self::SetQuantity { product_id, .. } | Self::Remove { product_id } => Some(product_id),
            Self::Clear => None,
        }
    }
}

/// Apply a mutation to a copy of `cart`.
#[must_use]
pub fn apply(cart: &Cart, mutation: &Mutation) -> Cart {
    let mut next = cart.clone();
    next.apply(mutation);
    next
}

/// Sum of unit price times quantity over all lines; zero for an empty cart.
#[must_use]
pub fn total_minor_units(cart: &Cart) -> MinorUnits {
    cart.items.iter().map(LineItem::line_total).sum()
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity).unwrap_or(if quantity < 0 { 0 } else { u32::MAX })
}

impl Cart {
    /// Apply a mutation in place.
    pub fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Add { product, quantity } => {
                let quantity = clamp_quantity(*quantity);
                if quantity == 0 {
                    return;
                }
                if let Some(line) = self
                    .items
                    .iter_mut()
                    .find(|line| line.product_id == product.product_id)
                {
                    line.quantity = line.quantity.saturating_add(quantity);
                } else {
                    self.items.push(LineItem::from_product(product, quantity));
                }
            }
            Mutation::SetQuantity {
                product_id,
                quantity,
            } => {
                let quantity = clamp_quantity(*quantity);
                if quantity == 0 {
                    self.items.retain(|line| &line.product_id != product_id);
                } else if let Some(line) = self
                    .items
                    .iter_mut()
                    .find(|line| &line.product_id == product_id)
                {
                    line.quantity = quantity;
                }
            }
            Mutation::Remove { product_id } => {
                self.items.retain(|line| &line.product_id != product_id);
            }
            Mutation::Clear => self.items.clear(),
        }
    }

    /// Total in minor units. See [`total_minor_units`].
    #[must_use]
    pub fn total(&self) -> MinorUnits {
        total_minor_units(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> ProductRef {
        ProductRef::new(ProductId::new(id), format!("Product {id}"), MinorUnits::new(price))
    }

    fn set(id: &str, quantity: i64) -> Mutation {
        Mutation::SetQuantity {
            product_id: ProductId::new(id),
            quantity,
        }
    }

    fn assert_invariants(cart: &Cart) {
        let mut seen = std::collections::HashSet::new();
        for line in &cart.items {
            assert!(line.quantity >= 1, "line {} has quantity 0", line.product_id);
            assert!(seen.insert(&line.product_id), "duplicate {}", line.product_id);
        }
    }

    #[test]
    fn test_add_appends_then_merges() {
        let mut cart = Cart::empty();
        cart.apply(&Mutation::add_one(product("a", 500)));
        cart.apply(&Mutation::add_one(product("b", 250)));
        cart.apply(&Mutation::Add {
            product: product("a", 500),
            quantity: 3,
        });

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].product_id.as_str(), "a");
        assert_eq!(cart.items[0].quantity, 4);
        assert_eq!(cart.total(), MinorUnits::new(2250));
    }

    #[test]
    fn test_add_non_positive_is_noop() {
        let cart = apply(
            &Cart::empty(),
            &Mutation::Add {
                product: product("a", 500),
                quantity: 0,
            },
        );
        assert!(cart.is_empty());

        let cart = apply(
            &cart,
            &Mutation::Add {
                product: product("a", 500),
                quantity: -4,
            },
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_is_idempotent() {
        let start = apply(&Cart::empty(), &Mutation::add_one(product("a", 500)));
        let once = apply(&start, &set("a", 3));
        let twice = apply(&once, &set("a", 3));
        assert_eq!(once, twice);
        assert_eq!(twice.quantity_of(&ProductId::new("a")), 3);
    }

    #[test]
    fn test_set_quantity_below_one_removes() {
        let start = apply(&Cart::empty(), &Mutation::add_one(product("a", 500)));
        assert!(apply(&start, &set("a", 0)).is_empty());
        assert!(apply(&start, &set("a", -2)).is_empty());
    }

    #[test]
    fn test_set_quantity_unknown_product_is_noop() {
        let start = apply(&Cart::empty(), &Mutation::add_one(product("a", 500)));
        assert_eq!(apply(&start, &set("zzz", 5)), start);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let start = apply(&Cart::empty(), &Mutation::add_one(product("a", 500)));
        let after = apply(
            &start,
            &Mutation::Remove {
                product_id: ProductId::new("nope"),
            },
        );
        assert_eq!(after, start);
    }

    #[test]
    fn test_clear_empties_and_total_is_zero() {
        let mut cart = Cart::empty();
        cart.apply(&Mutation::add_one(product("a", 500)));
        cart.apply(&Mutation::add_one(product("b", 700)));
        cart.apply(&Mutation::Clear);
        assert!(cart.is_empty());
        assert_eq!(total_minor_units(&cart), MinorUnits::ZERO);
    }

    #[test]
    fn test_quantities_saturate() {
        let mut cart = Cart::empty();
        cart.apply(&Mutation::Add {
            product: product("a", 1),
            quantity: i64::MAX,
        });
        cart.apply(&Mutation::add_one(product("a", 1)));
        assert_eq!(cart.quantity_of(&ProductId::new("a")), u32::MAX);
    }

    #[test]
    fn test_invariants_hold_for_mixed_sequences() {
        let ids = ["a", "b", "c"];
        let mut cart = Cart::empty();
        // Deterministic pseudo-random walk over the mutation space.
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let id = ids[usize::try_from(seed % 3).unwrap_or(0)];
            let quantity = i64::try_from(seed % 7).unwrap_or(0) - 2;
            let mutation = match seed % 4 {
                0 => Mutation::Add {
                    product: product(id, 100),
                    quantity,
                },
                1 => set(id, quantity),
                2 => Mutation::Remove {
                    product_id: ProductId::new(id),
                },
                _ => Mutation::add_one(product(id, 100)),
            };
            cart.apply(&mutation);
            assert_invariants(&cart);
        }
    }

    #[test]
    fn test_scenario_set_to_zero_empties_total() {
        let cart = apply(
            &Cart::empty(),
            &Mutation::Add {
                product: product("A", 500),
                quantity: 2,
            },
        );
        assert_eq!(cart.total(), MinorUnits::new(1000));

        let cart = apply(&cart, &set("A", 0));
        assert!(cart.is_empty());
        assert_eq!(cart.total(), MinorUnits::ZERO);
    }
}
