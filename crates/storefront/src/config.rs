//! Cart client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_API_BASE_URL` - Base URL of the remote cart service
//!
//! ## Optional
//! - `CART_API_TOKEN` - Bearer credential for the cart and payment services
//! - `PAYMENT_API_BASE_URL` - Payment session service (default: cart base URL)
//! - `CHECKOUT_SUCCESS_URL` - Where the hosted payment page returns on success
//! - `CHECKOUT_CANCEL_URL` - Where the hosted payment page returns on cancel
//! - `CART_SYNC_DEBOUNCE_MS` - Debounce window for coalescing edits (default: 300)
//! - `CART_SYNC_MAX_ATTEMPTS` - Attempts per request before giving up (default: 3)
//! - `CART_SYNC_BACKOFF_MS` - Initial retry backoff (default: 250)
//! - `CART_SYNC_BACKOFF_MAX_MS` - Retry backoff cap (default: 4000)
//! - `CART_REQUEST_TIMEOUT_MS` - Per-request timeout (default: 10000)
//! - `CART_SYNC_MAX_CONFLICTS` - Consecutive conflict refetches (default: 3)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Cart client configuration.
#[derive(Debug, Clone)]
pub struct CartClientConfig {
    /// Remote cart service configuration
    pub cart_api: CartApiConfig,
    /// Payment session service configuration
    pub payment_api: PaymentApiConfig,
    /// Synchronizer timing and retry policy
    pub sync: SyncConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Remote cart service configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct CartApiConfig {
    /// Base URL, e.g. `https://shop.example/api/v1/`
    pub base_url: Url,
    /// Bearer credential, when one is issued up front
    pub access_token: Option<SecretString>,
}

impl std::fmt::Debug for CartApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Payment session service configuration.
#[derive(Debug, Clone)]
pub struct PaymentApiConfig {
    /// Base URL of the payment session service
    pub base_url: Url,
    /// Return URL after a completed payment
    pub success_url: Option<Url>,
    /// Return URL after an abandoned payment
    pub cancel_url: Option<Url>,
    /// Timeout for session creation
    pub request_timeout: Duration,
}

impl PaymentApiConfig {
    /// Configuration with no return URLs and the default timeout.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            success_url: None,
            cancel_url: None,
            request_timeout: SyncConfig::default().request_timeout,
        }
    }
}

/// Synchronizer timing and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last edit before a request is sent
    pub debounce: Duration,
    /// Attempts per request for transient failures (at least 1)
    pub max_attempts: u32,
    /// First retry delay; doubles on each retry
    pub backoff_base: Duration,
    /// Upper bound for a single retry delay
    pub backoff_max: Duration,
    /// Caller-imposed timeout for each gateway call
    pub request_timeout: Duration,
    /// Consecutive conflict refetches before entering the error state
    pub max_conflicts: u32,
    /// Buffered snapshots per subscriber before it lags
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            request_timeout: Duration::from_secs(10),
            max_conflicts: 3,
            event_capacity: 64,
        }
    }
}

impl CartClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the access token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let cart_api = CartApiConfig::from_env()?;
        let sync = SyncConfig::from_env()?;
        let payment_api = PaymentApiConfig::from_env(&cart_api.base_url, &sync)?;

        Ok(Self {
            cart_api,
            payment_api,
            sync,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl CartApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_required_url("CART_API_BASE_URL")?;
        let access_token = match get_optional_env("CART_API_TOKEN") {
            Some(token) => {
                validate_secret_strength(&token, "CART_API_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };
        Ok(Self {
            base_url,
            access_token,
        })
    }
}

impl PaymentApiConfig {
    fn from_env(cart_base_url: &Url, sync: &SyncConfig) -> Result<Self, ConfigError> {
        let base_url = match get_optional_env("PAYMENT_API_BASE_URL") {
            Some(value) => parse_url("PAYMENT_API_BASE_URL", &value)?,
            None => cart_base_url.clone(),
        };
        Ok(Self {
            base_url,
            success_url: get_optional_url("CHECKOUT_SUCCESS_URL")?,
            cancel_url: get_optional_url("CHECKOUT_CANCEL_URL")?,
            request_timeout: sync.request_timeout,
        })
    }
}

impl SyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts: u32 = get_parsed_or("CART_SYNC_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_SYNC_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            debounce: get_millis_or("CART_SYNC_DEBOUNCE_MS", defaults.debounce)?,
            max_attempts,
            backoff_base: get_millis_or("CART_SYNC_BACKOFF_MS", defaults.backoff_base)?,
            backoff_max: get_millis_or("CART_SYNC_BACKOFF_MAX_MS", defaults.backoff_max)?,
            request_timeout: get_millis_or("CART_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            max_conflicts: get_parsed_or("CART_SYNC_MAX_CONFLICTS", defaults.max_conflicts)?,
            event_capacity: defaults.event_capacity,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Get a required URL, normalized to end with `/` so relative joins keep the path.
fn get_required_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    let mut url = parse_url(key, &value)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn get_optional_url(key: &str) -> Result<Option<Url>, ConfigError> {
    get_optional_env(key)
        .map(|value| parse_url(key, &value))
        .transpose()
}

/// Parse an optional environment variable, falling back to a default.
fn get_parsed_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn get_millis_or(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    get_parsed_or(key, default_ms).map(Duration::from_millis)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the token issued by the auth service."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "CART_API_TOKEN");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "CART_API_TOKEN");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "CART_API_TOKEN");
        assert!(result.is_ok());
    }

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.max_attempts, 3);
        assert!(config.backoff_base < config.backoff_max);
    }

    #[test]
    fn test_cart_api_config_debug_redacts_token() {
        let config = CartApiConfig {
            base_url: Url::parse("https://cart.test/api/").unwrap(),
            access_token: Some(SecretString::from("super_secret_bearer_token")),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("https://cart.test/api/"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_bearer_token"));
    }

    #[test]
    fn test_payment_config_new_has_no_return_urls() {
        let config = PaymentApiConfig::new(Url::parse("https://pay.test/").unwrap());
        assert!(config.success_url.is_none());
        assert!(config.cancel_url.is_none());
    }
}
