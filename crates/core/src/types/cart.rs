//! Cart and line item types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CartVersion, ProductId};
use super::price::MinorUnits;

/// Product details needed to show a line the server has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    /// Product identifier.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price in minor units.
    pub unit_price: MinorUnits,
    /// Thumbnail image URL.
    pub thumbnail: Option<String>,
}

impl ProductRef {
    /// Create a product reference without a thumbnail.
    #[must_use]
    pub fn new(product_id: ProductId, name: impl Into<String>, unit_price: MinorUnits) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            thumbnail: None,
        }
    }

    /// Attach a thumbnail URL.
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

/// A single product line in a cart.
///
/// `quantity` is always at least 1; a line that would drop to zero is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product identifier, unique within a cart.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price in minor units.
    pub unit_price: MinorUnits,
    /// Quantity (>= 1).
    pub quantity: u32,
    /// Thumbnail image URL.
    pub thumbnail: Option<String>,
}

impl LineItem {
    /// Build a line from a product reference.
    #[must_use]
    pub fn from_product(product: &ProductRef, quantity: u32) -> Self {
        Self {
            product_id: product.product_id.clone(),
            name: product.name.clone(),
            unit_price: product.unit_price,
            quantity,
            thumbnail: product.thumbnail.clone(),
        }
    }

    /// The product reference this line was built from.
    #[must_use]
    pub fn product(&self) -> ProductRef {
        ProductRef {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            unit_price: self.unit_price,
            thumbnail: self.thumbnail.clone(),
        }
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> MinorUnits {
        self.unit_price.times(self.quantity)
    }
}

/// A shopping cart: line items in insertion order plus the server version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Lines in insertion order.
    pub items: Vec<LineItem>,
    /// Version the server assigned at its last write.
    pub version: CartVersion,
    /// Time of the server's last write, if known.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// An empty cart at version zero.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the line for a product.
    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|line| &line.product_id == product_id)
    }

    /// Quantity of a product, 0 if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.line(product_id).map_or(0, |line| line.quantity)
    }

    /// Total number of units across all lines (cart badge count).
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Enforce cart invariants on data from outside the ledger.
    ///
    /// Lines with a zero quantity are dropped and a repeated product keeps
    /// only its first line.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.items
            .retain(|line| line.quantity >= 1 && seen.insert(line.product_id.clone()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, quantity: u32) -> LineItem {
        LineItem {
            product_id: ProductId::new(id),
            name: id.to_uppercase(),
            unit_price: MinorUnits::new(100),
            quantity,
            thumbnail: None,
        }
    }

    #[test]
    fn test_item_count_sums_quantities() {
        let cart = Cart {
            items: vec![line("a", 2), line("b", 3)],
            ..Cart::empty()
        };
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.quantity_of(&ProductId::new("b")), 3);
        assert_eq!(cart.quantity_of(&ProductId::new("c")), 0);
    }

    #[test]
    fn test_normalized_drops_zero_and_duplicates() {
        let cart = Cart {
            items: vec![line("a", 2), line("b", 0), line("a", 7), line("c", 1)],
            ..Cart::empty()
        }
        .normalized();

        let ids: Vec<_> = cart.items.iter().map(|l| l.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(cart.quantity_of(&ProductId::new("a")), 2);
    }
}
