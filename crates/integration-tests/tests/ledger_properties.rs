//! Quantity ledger invariants over random edit sequences.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storefront_cart_core::{Cart, MinorUnits, Mutation, ProductId, apply, total_minor_units};
use storefront_cart_integration_tests::product;

fn random_mutation(rng: &mut StdRng) -> Mutation {
    let id = ["a", "b", "c", "d"][rng.random_range(0..4)];
    match rng.random_range(0..10) {
        0..=3 => Mutation::Add {
            product: product(id, 500),
            quantity: rng.random_range(-2..6),
        },
        4..=6 => Mutation::SetQuantity {
            product_id: ProductId::new(id),
            quantity: rng.random_range(-1..8),
        },
        7 | 8 => Mutation::Remove {
            product_id: ProductId::new(id),
        },
        _ => Mutation::Clear,
    }
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn test_random_sequences_keep_lines_unique_and_positive() {
    let mut rng = StdRng::seed_from_u64(0x00ca_7700);
    for _ in 0..200 {
        let mut cart = Cart::empty();
        for _ in 0..40 {
            cart = apply(&cart, &random_mutation(&mut rng));

            let mut seen = HashSet::new();
            for line in &cart.items {
                assert!(seen.insert(line.product_id.clone()), "duplicate line");
                assert!(line.quantity >= 1, "line with quantity < 1");
            }
            let expected: i64 = cart
                .items
                .iter()
                .map(|l| 500 * i64::from(l.quantity))
                .sum();
            assert_eq!(total_minor_units(&cart), MinorUnits::new(expected));
        }
    }
}

#[test]
fn test_set_quantity_twice_equals_once() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let mut cart = Cart::empty();
        for _ in 0..10 {
            cart = apply(&cart, &random_mutation(&mut rng));
        }
        let set = Mutation::SetQuantity {
            product_id: ProductId::new("b"),
            quantity: rng.random_range(0..5),
        };
        let once = apply(&cart, &set);
        assert_eq!(apply(&once, &set), once);
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_setting_quantity_to_zero_removes_line() {
    let mut cart = Cart::empty();
    cart.apply(&Mutation::Add {
        product: product("a", 500),
        quantity: 2,
    });
    assert_eq!(cart.total(), MinorUnits::new(1000));

    cart.apply(&Mutation::SetQuantity {
        product_id: ProductId::new("a"),
        quantity: 0,
    });
    assert!(cart.is_empty());
    assert_eq!(cart.total(), MinorUnits::new(0));
}
