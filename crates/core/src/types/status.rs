//! Status enums for the cart synchronizer and checkout sessions.

use serde::{Deserialize, Serialize};

/// Synchronization state of a local cart relative to the remote cart.
///
/// State transitions:
/// ```text
/// Idle ──intent──► Dirty ──debounce──► Syncing ──┬──► Idle
///  ▲                 ▲                           ├──► Dirty (newer edits queued)
///  │                 └──────────intent───────────┤
///  └──────────────sync_cart──────────────────────┴──► Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No outstanding mutations; local view equals the last server view.
    #[default]
    Idle,
    /// One or more local edits are not yet confirmed by the server.
    Dirty,
    /// A request to the remote cart is in flight.
    Syncing,
    /// The last reconciliation failed terminally; the local view is retained.
    Error,
}

impl SyncState {
    /// Returns true if no request is in flight and none is scheduled.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }

    /// Returns the state name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dirty => "dirty",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a checkout session.
///
/// ```text
/// Pending ──┬──► Succeeded
///           ├──► Canceled
///           └──► Failed (expired)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Waiting for the shopper to finish the hosted payment flow.
    Pending,
    /// Payment completed (terminal).
    Succeeded,
    /// Shopper abandoned the payment flow (terminal).
    Canceled,
    /// The session expired or could not complete (terminal).
    Failed,
}

impl CheckoutStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Canceled => write!(f, "canceled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CheckoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" | "success" => Ok(Self::Succeeded),
            "canceled" | "cancelled" | "cancel" => Ok(Self::Canceled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid checkout status: {s}")),
        }
    }
}
