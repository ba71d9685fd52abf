//! Integer money in the currency's smallest unit.
//!
//! Prices travel as whole minor units (cents for USD) so sums never drift.
//! Conversion to a decimal amount happens only when rendering.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount of money in minor units (e.g., cents).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from a count of minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Get the raw count of minor units.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Multiply a unit price by a quantity, saturating on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Amount in the currency's standard unit (e.g., dollars).
    #[must_use]
    pub fn to_decimal(&self, currency: CurrencyCode) -> Decimal {
        Decimal::new(self.0, currency.minor_unit_digits())
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self, currency: CurrencyCode) -> String {
        let amount = self.to_decimal(currency);
        let digits = usize::try_from(currency.minor_unit_digits()).unwrap_or(2);
        if amount.is_sign_negative() {
            format!("-{}{:.digits$}", currency.symbol(), amount.abs())
        } else {
            format!("{}{amount:.digits$}", currency.symbol())
        }
    }
}

impl Add for MinorUnits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for MinorUnits {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<i64> for MinorUnits {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(CurrencyCode::default()))
    }
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
    JPY,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::JPY => "¥",
        }
    }

    /// Number of minor-unit digits (2 for cents, 0 for yen).
    #[must_use]
    pub const fn minor_unit_digits(&self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }
}
