//! Core types for the storefront cart.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod price;
pub mod status;

pub use cart::{Cart, LineItem, ProductRef};
pub use id::*;
pub use price::{CurrencyCode, MinorUnits};
pub use status::*;
