//! Error taxonomy with Sentry integration.
//!
//! Gateway errors are classified by how the synchronizer reacts to them:
//! transient errors are retried, conflicts are healed by refetching, and the
//! rest are surfaced to the presentation layer.

use storefront_cart_core::SessionId;
use thiserror::Error;

/// Errors returned by the remote cart and payment gateways.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The bearer credential is missing or expired.
    #[error("not authenticated")]
    NotAuthenticated,

    /// No response was received (connection failure or timeout).
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The server's cart version differs from the one the client assumed.
    #[error("cart version conflict")]
    Conflict,

    /// The server failed (5xx, rate limiting, or an unreadable success body).
    #[error("server error ({}): {message}", .status.map_or_else(|| "-".to_string(), |s| s.to_string()))]
    ServerError {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Error detail.
        message: String,
    },

    /// The server rejected the request (4xx other than conflict).
    #[error("invalid request ({status}): {message}")]
    Invalid {
        /// HTTP status.
        status: u16,
        /// Error detail from the server.
        message: String,
    },
}

impl GatewayError {
    /// Returns true for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_) | Self::ServerError { .. })
    }

    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::NotAuthenticated,
            409 | 412 => Self::Conflict,
            429 | 500..=599 => Self::ServerError {
                status: Some(status.as_u16()),
                message,
            },
            code => Self::Invalid {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ServerError {
                status: err.status().map(|s| s.as_u16()),
                message: format!("unreadable response: {err}"),
            }
        } else if let Some(status) = err.status() {
            Self::from_status(status, err.to_string())
        } else {
            Self::NetworkUnavailable(err.to_string())
        }
    }
}

/// Errors surfaced by the checkout session manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// The synchronized cart has no line items.
    #[error("cart is empty")]
    EmptyCart,

    /// A session for this cart is already being created or awaiting payment.
    #[error("a checkout session is already pending")]
    SessionAlreadyPending,

    /// The payment session could not be created. The cart stays editable.
    #[error("checkout initiation failed: {0}")]
    CheckoutInitiationFailed(#[source] GatewayError),

    /// There is no pending session to resolve.
    #[error("no pending checkout session")]
    NoPendingSession,

    /// The return from the payment page names a different session.
    #[error("checkout return for session {received} does not match pending session {expected}")]
    SessionMismatch {
        /// The pending session.
        expected: SessionId,
        /// The session named by the return.
        received: SessionId,
    },
}

/// Result type alias for `CheckoutError`.
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Report a terminal failure to Sentry and the log.
pub fn capture_failure(context: &str, err: &(dyn std::error::Error + 'static)) {
    let event_id = sentry::capture_error(err);
    tracing::error!(
        error = %err,
        context,
        sentry_event_id = %event_id,
        "Cart failure"
    );
}

/// Add a breadcrumb for shopper actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart edits
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Set quantity", Some(&[("product_id", "sku-1"), ("quantity", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
