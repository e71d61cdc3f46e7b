//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Renders a 0-5 rating as five stars, rounding to the nearest whole star.
///
/// Usage in templates: `{{ product.rating|stars }}`
#[askama::filter_fn]
pub fn stars(rating: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(star_string(&rating.to_string()))
}

fn star_string(rating: &str) -> String {
    let filled = Decimal::from_str(rating)
        .ok()
        .and_then(|r| r.round().to_usize())
        .unwrap_or(0)
        .min(5);
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_string_rounds_and_clamps() {
        assert_eq!(star_string("4.6"), "★★★★★");
        assert_eq!(star_string("3.2"), "★★★☆☆");
        assert_eq!(star_string("0"), "☆☆☆☆☆");
        assert_eq!(star_string("9"), "★★★★★");
        assert_eq!(star_string("n/a"), "☆☆☆☆☆");
    }
}
