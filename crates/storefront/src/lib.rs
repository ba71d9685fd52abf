//! Storefront cart client library.
//!
//! Keeps a shopper's cart in sync with the remote cart service and turns a
//! synchronized cart into a hosted payment session.
//!
//! # Modules
//!
//! - [`sync`] - The cart synchronizer: optimistic edits, debounced net-effect
//!   requests, conflict healing and the subscribe/notify contract
//! - [`checkout`] - Checkout session lifecycle on top of a synchronizer
//! - [`gateway`] - Remote cart service (HTTP and in-memory)
//! - [`payment`] - Payment session service (HTTP and in-memory)
//! - [`auth`] - Bearer credential seam consumed by both gateways
//! - [`config`] - Environment configuration
//! - [`error`] - Error taxonomy and Sentry helpers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod payment;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use checkout::{CheckoutOutcome, CheckoutReturn, CheckoutSession, CheckoutSessionManager};
pub use error::{CheckoutError, GatewayError};
pub use sync::{CartSnapshot, CartSynchronizer};
