//! JSON wire format of the remote cart service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_cart_core::{Cart, CartVersion, LineItem, MinorUnits, ProductId};

/// Cart as returned by every cart endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartData {
    #[serde(default)]
    pub items: Vec<LineItemData>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemData {
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    pub unit_price_minor_units: i64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Body of `POST /cart/items`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemBody<'a> {
    pub product_id: &'a str,
    pub quantity: u32,
}

/// Body of `POST /cart/items/{productId}`.
#[derive(Debug, Serialize)]
pub struct SetQuantityBody {
    pub quantity: u32,
}

/// Error body (`{"error": "..."}`) returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Extract the server's error message, falling back to a truncated body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.chars().take(200).collect(), |b| b.error)
}

/// Convert a server cart, enforcing cart invariants.
pub fn convert_cart(data: CartData) -> Cart {
    Cart {
        items: data.items.into_iter().map(convert_line).collect(),
        version: CartVersion::new(data.version),
        updated_at: data.updated_at,
    }
    .normalized()
}

fn convert_line(line: LineItemData) -> LineItem {
    LineItem {
        product_id: ProductId::new(line.product_id),
        name: line.name,
        unit_price: MinorUnits::new(line.unit_price_minor_units),
        quantity: line.quantity,
        thumbnail: line.thumbnail,
    }
}

impl From<&Cart> for CartData {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart
                .items
                .iter()
                .map(|line| LineItemData {
                    product_id: line.product_id.as_str().to_string(),
                    name: line.name.clone(),
                    unit_price_minor_units: line.unit_price.as_i64(),
                    quantity: line.quantity,
                    thumbnail: line.thumbnail.clone(),
                })
                .collect(),
            version: cart.version.as_u64(),
            updated_at: cart.updated_at,
        }
    }
}
