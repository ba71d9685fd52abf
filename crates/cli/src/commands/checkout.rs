//! Checkout session commands.

use std::io::BufRead;

use storefront_cart::{CheckoutOutcome, CheckoutReturn};
use tracing::info;
use url::Url;

use super::{Client, report};

/// Create a payment session and log its URL.
///
/// With `wait`, read the URL the payment page returned to from stdin and
/// resolve the session. A URL matching the configured cancel URL counts as
/// canceled; anything else as succeeded.
///
/// # Errors
///
/// Returns an error if the session cannot be created or the return URL is
/// invalid or names another session.
pub async fn begin(client: &Client, wait: bool) -> Result<(), Box<dyn std::error::Error>> {
    let checkout_url = client.checkout.begin_checkout().await?;
    info!(url = %checkout_url, "Open the payment page to complete checkout");
    if !wait {
        return Ok(());
    }

    info!("Paste the return URL and press enter");
    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|_| line)
    })
    .await??;

    let return_url = Url::parse(line.trim())?;
    let outcome = if is_cancel_url(client, &return_url) {
        CheckoutOutcome::Canceled
    } else {
        CheckoutOutcome::Succeeded
    };
    let checkout_return = CheckoutReturn::from_url(outcome, &return_url);
    let session = client.checkout.resolve_return_with(&checkout_return).await?;
    info!(
        session_id = %session.session_id,
        order_id = %session.order_id,
        status = %session.status,
        "Checkout finished"
    );

    report(&client.sync.snapshot());
    Ok(())
}

fn is_cancel_url(client: &Client, url: &Url) -> bool {
    client
        .checkout
        .cancel_url()
        .is_some_and(|cancel| cancel.path() == url.path() && cancel.host() == url.host())
}
