//! Bearer credential seam.
//!
//! Credentials are issued and refreshed by an external auth service. The
//! gateways only ask for the current token; the synchronizer only signals
//! that a refresh is needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use secrecy::SecretString;
use tokio::sync::Notify;

/// Supplies the bearer credential for the remote cart and payment services.
pub trait CredentialProvider: Send + Sync {
    /// The current bearer token, if one has been issued.
    fn bearer_token(&self) -> Option<SecretString>;

    /// Whether the credential is believed to be usable.
    fn is_valid(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// Ask the auth collaborator to refresh the credential.
    ///
    /// Called after the remote service rejected the current one.
    fn request_refresh(&self);
}

/// A credential set by the embedding application.
///
/// Refresh requests are counted and announced on [`StaticCredentials::refresh_requested`]
/// so the host can re-authenticate and call [`StaticCredentials::set_token`].
#[derive(Default)]
pub struct StaticCredentials {
    token: RwLock<Option<SecretString>>,
    refresh_requests: AtomicUsize,
    refresh_notify: Notify,
}

impl StaticCredentials {
    /// Credentials holding the given token.
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token: RwLock::new(Some(token)),
            ..Self::default()
        }
    }

    /// Credentials with no token (guest before sign-in, or in tests).
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Replace the token.
    pub fn set_token(&self, token: SecretString) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Drop the token so later calls fail with `NotAuthenticated`.
    pub fn invalidate(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Number of refresh requests received so far.
    #[must_use]
    pub fn refresh_requests(&self) -> usize {
        self.refresh_requests.load(Ordering::SeqCst)
    }

    /// Wait for the next refresh request.
    pub async fn refresh_requested(&self) {
        self.refresh_notify.notified().await;
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<SecretString> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn request_refresh(&self) {
        self.refresh_requests.fetch_add(1, Ordering::SeqCst);
        self.refresh_notify.notify_waiters();
        tracing::info!("Credential refresh requested");
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("token", &self.is_valid().then_some("[REDACTED]"))
            .field("refresh_requests", &self.refresh_requests())
            .finish()
    }
}
