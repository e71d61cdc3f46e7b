//! Prices in US dollars using decimal arithmetic.
//!
//! The shop only sells in USD, so a price is a plain [`Decimal`] amount in
//! dollars. Arithmetic never goes negative: subtraction saturates at zero.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A non-negative USD amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a dollar amount. Negative amounts clamp to zero.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount.max(Decimal::ZERO))
    }

    /// Create a price from whole dollars.
    #[must_use]
    pub fn dollars(amount: u32) -> Self {
        Self(Decimal::from(amount))
    }

    /// Create a price from cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self::new(Decimal::new(cents, 2))
    }

    /// The dollar amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// `true` if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Price multiplied by a quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Subtract, stopping at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self::new(self.0 - other.0)
    }

    /// `percent` percent of this price, rounded half-up to cents.
    #[must_use]
    pub fn percent(self, percent: Decimal) -> Self {
        let raw = self.0 * percent / Decimal::ONE_HUNDRED;
        Self::new(raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Format for display, e.g. `$1,299.00`.
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let text = format!("{rounded:.2}");
        let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        format!("${grouped}.{cents}")
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::dollars(999).display(), "$999.00");
        assert_eq!(Price::dollars(1299).display(), "$1,299.00");
        assert_eq!(Price::from_cents(123_456_789).display(), "$1,234,567.89");
        assert_eq!(Price::ZERO.display(), "$0.00");
    }

    #[test]
    fn test_negative_amounts_clamp() {
        assert_eq!(Price::new(Decimal::from(-5)), Price::ZERO);
        assert_eq!(Price::dollars(5).saturating_sub(Price::dollars(9)), Price::ZERO);
    }

    #[test]
    fn test_percent_rounds_to_cents() {
        let price = Price::new(Decimal::from_str("19.99").unwrap());
        assert_eq!(price.percent(Decimal::from(15)), Price::from_cents(300));
    }

    #[test]
    fn test_sum_and_times() {
        let total: Price = [Price::dollars(10).times(3), Price::dollars(5)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::dollars(35));
    }

    #[test]
    fn test_deserializes_from_number_or_string() {
        let a: Price = serde_json::from_str("1299.5").unwrap();
        let b: Price = serde_json::from_str("\"1299.50\"").unwrap();
        assert_eq!(a, b);
    }
}
