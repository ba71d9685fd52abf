//! Cart edits. Each edit is flushed before the command returns.

use storefront_cart::{CartSnapshot, CartSynchronizer, GatewayError};
use storefront_cart_core::{MinorUnits, ProductId, ProductRef, SyncState};

use super::{Client, report};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Print the cart loaded at startup.
pub fn show(client: &Client) {
    report(&client.sync.snapshot());
}

/// Add `quantity` units of a product.
///
/// # Errors
///
/// Returns an error if the server rejects the edit or cannot be reached.
pub async fn add(
    client: &Client,
    product_id: &str,
    name: Option<String>,
    price: i64,
    quantity: i64,
) -> CommandResult {
    let product_id = ProductId::parse(product_id)?;
    let name = name.unwrap_or_else(|| product_id.to_string());
    client.sync.add_item(
        ProductRef::new(product_id, name, MinorUnits::new(price)),
        quantity,
    );
    settle(&client.sync).await
}

/// Set a line's quantity.
///
/// # Errors
///
/// Returns an error if the server rejects the edit or cannot be reached.
pub async fn set(client: &Client, product_id: &str, quantity: i64) -> CommandResult {
    client
        .sync
        .set_quantity(ProductId::parse(product_id)?, quantity);
    settle(&client.sync).await
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if the server rejects the edit or cannot be reached.
pub async fn remove(client: &Client, product_id: &str) -> CommandResult {
    client.sync.remove_item(ProductId::parse(product_id)?);
    settle(&client.sync).await
}

/// Remove every line.
///
/// # Errors
///
/// Returns an error if the server rejects the edit or cannot be reached.
pub async fn clear(client: &Client) -> CommandResult {
    client.sync.clear();
    settle(&client.sync).await
}

/// Refetch the server cart.
///
/// # Errors
///
/// Returns an error if the server cannot be reached.
pub async fn sync(client: &Client) -> CommandResult {
    let snapshot = client.sync.sync_cart().await?;
    report(&snapshot);
    Ok(())
}

async fn settle(sync: &CartSynchronizer) -> CommandResult {
    let snapshot: CartSnapshot = sync.flush().await;
    report(&snapshot);
    if snapshot.state == SyncState::Error {
        let err = snapshot
            .last_error
            .unwrap_or_else(|| GatewayError::NetworkUnavailable("cart not synchronized".into()));
        return Err(err.into());
    }
    Ok(())
}
