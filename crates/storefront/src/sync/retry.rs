//! Bounded retry with exponential backoff and a per-call timeout.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;
use crate::error::GatewayError;

/// Run `call` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up. A call exceeding `request_timeout` counts as
/// `NetworkUnavailable`.
pub(crate) async fn with_backoff<T, F, Fut>(
    config: &SyncConfig,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::time::timeout(config.request_timeout, call())
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::NetworkUnavailable(format!(
                    "{operation} timed out after {}ms",
                    config.request_timeout.as_millis()
                )))
            });

        match result {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Cart request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Delay before retry number `attempt` (1-based): the doubled base capped
/// at `backoff_max`, jittered into its upper half.
pub(crate) fn backoff_delay(config: &SyncConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let capped = config
        .backoff_base
        .saturating_mul(1_u32 << exponent)
        .min(config.backoff_max);
    let half = capped / 2;
    let spread = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
    let jitter = Duration::from_millis(rand::rng().random_range(0..=spread));
    half + jitter
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> SyncConfig {
        SyncConfig {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_millis(300),
            request_timeout: Duration::from_secs(1),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = config();
        for _ in 0..50 {
            let first = backoff_delay(&config, 1);
            assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));
            let second = backoff_delay(&config, 2);
            assert!(second >= Duration::from_millis(100) && second <= Duration::from_millis(200));
            let late = backoff_delay(&config, 10);
            assert!(late <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_backoff(&config(), "fetch_cart", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GatewayError::ServerError {
                    status: Some(503),
                    message: String::new(),
                })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&config(), "add_item", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::NetworkUnavailable("down".into()))
        })
        .await;
        assert!(matches!(result, Err(GatewayError::NetworkUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&config(), "clear", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Conflict)
        })
        .await;
        assert_eq!(result, Err(GatewayError::Conflict));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_network_unavailable() {
        let result: Result<(), _> = with_backoff(&config(), "fetch_cart", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GatewayError::NetworkUnavailable(msg)) if msg.contains("timed out")));
    }
}
