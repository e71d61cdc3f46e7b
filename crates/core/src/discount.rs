//! Discount codes and their evaluation at checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DiscountCodeId, DiscountKind, Price};

/// A discount code row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    /// Always stored upper-case.
    pub code: String,
    pub kind: DiscountKind,
    /// Percentage points or dollars, depending on `kind`.
    pub value: Decimal,
    #[serde(default)]
    pub min_subtotal: Option<Price>,
    #[serde(default)]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub usage_count: i32,
    pub active: bool,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why a code cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountRejection {
    #[error("this code does not exist")]
    UnknownCode,
    #[error("this code is no longer active")]
    Inactive,
    #[error("this code is not valid yet")]
    NotStarted,
    #[error("this code has expired")]
    Expired,
    #[error("orders must be at least {minimum} to use this code")]
    BelowMinimum { minimum: Price },
    #[error("this code has reached its usage limit")]
    UsageLimitReached,
}

/// Canonical form of a code typed by a shopper.
#[must_use]
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl DiscountCode {
    /// Amount taken off `subtotal` at `now`.
    ///
    /// Percentages are capped at 100 and fixed amounts at the subtotal, so the
    /// result never exceeds `subtotal`.
    ///
    /// # Errors
    ///
    /// Returns the first [`DiscountRejection`] that applies.
    pub fn evaluate(&self, subtotal: Price, now: DateTime<Utc>) -> Result<Price, DiscountRejection> {
        if !self.active {
            return Err(DiscountRejection::Inactive);
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(DiscountRejection::NotStarted);
        }
        if self.expires_at.is_some_and(|end| now >= end) {
            return Err(DiscountRejection::Expired);
        }
        if let Some(limit) = self.usage_limit
            && self.usage_count >= limit
        {
            return Err(DiscountRejection::UsageLimitReached);
        }
        if let Some(minimum) = self.min_subtotal
            && subtotal < minimum
        {
            return Err(DiscountRejection::BelowMinimum { minimum });
        }

        let off = match self.kind {
            DiscountKind::Percentage => {
                subtotal.percent(self.value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED))
            }
            DiscountKind::FixedAmount => Price::new(self.value),
        };

        Ok(off.min(subtotal))
    }

    /// Short description such as `15% off` or `$100.00 off`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.kind {
            DiscountKind::Percentage => format!("{}% off", self.value.normalize()),
            DiscountKind::FixedAmount => format!("{} off", Price::new(self.value)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn code(kind: DiscountKind, value: i64) -> DiscountCode {
        DiscountCode {
            id: DiscountCodeId::new(1),
            code: "WELCOME".to_string(),
            kind,
            value: Decimal::from(value),
            min_subtotal: None,
            usage_limit: None,
            usage_count: 0,
            active: true,
            starts_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_percentage_and_fixed() {
        let now = Utc::now();
        let pct = code(DiscountKind::Percentage, 10);
        assert_eq!(pct.evaluate(Price::dollars(1500), now), Ok(Price::dollars(150)));

        let fixed = code(DiscountKind::FixedAmount, 200);
        assert_eq!(fixed.evaluate(Price::dollars(1500), now), Ok(Price::dollars(200)));
    }

    #[test]
    fn test_caps_never_exceed_subtotal() {
        let now = Utc::now();
        let fixed = code(DiscountKind::FixedAmount, 500);
        assert_eq!(fixed.evaluate(Price::dollars(120), now), Ok(Price::dollars(120)));

        let pct = code(DiscountKind::Percentage, 150);
        assert_eq!(pct.evaluate(Price::dollars(80), now), Ok(Price::dollars(80)));
    }

    #[test]
    fn test_window_and_flags() {
        let now = Utc::now();
        let mut c = code(DiscountKind::Percentage, 10);

        c.active = false;
        assert_eq!(c.evaluate(Price::dollars(10), now), Err(DiscountRejection::Inactive));

        c.active = true;
        c.starts_at = Some(now + Duration::days(1));
        assert_eq!(c.evaluate(Price::dollars(10), now), Err(DiscountRejection::NotStarted));

        c.starts_at = None;
        c.expires_at = Some(now);
        assert_eq!(c.evaluate(Price::dollars(10), now), Err(DiscountRejection::Expired));
    }

    #[test]
    fn test_usage_limit_and_minimum() {
        let now = Utc::now();
        let mut c = code(DiscountKind::FixedAmount, 50);
        c.usage_limit = Some(3);
        c.usage_count = 3;
        assert_eq!(
            c.evaluate(Price::dollars(1000), now),
            Err(DiscountRejection::UsageLimitReached)
        );

        c.usage_count = 0;
        c.min_subtotal = Some(Price::dollars(500));
        assert_eq!(
            c.evaluate(Price::dollars(499), now),
            Err(DiscountRejection::BelowMinimum {
                minimum: Price::dollars(500)
            })
        );
        assert_eq!(c.evaluate(Price::dollars(500), now), Ok(Price::dollars(50)));
    }

    #[test]
    fn test_normalize_and_describe() {
        assert_eq!(normalize_code("  spring25 "), "SPRING25");
        assert_eq!(code(DiscountKind::Percentage, 15).describe(), "15% off");
        assert_eq!(code(DiscountKind::FixedAmount, 100).describe(), "$100.00 off");
    }
}
