//! Storefront Cart Core - Shared types library.
//!
//! This crate provides the types shared by every storefront cart component:
//! - `storefront-cart` - Cart synchronizer, gateways and checkout sessions
//! - `storefront-cart-cli` - Command-line driver for a live cart service
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, carts, and statuses
//! - [`ledger`] - The quantity ledger: pure cart mutations and totals

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ledger;
pub mod types;

pub use ledger::{Mutation, apply, total_minor_units};
pub use types::*;
