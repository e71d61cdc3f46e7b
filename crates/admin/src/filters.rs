//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// `true`/`false` as `Yes`/`No`.
#[askama::filter_fn]
pub fn yes_no(value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(if value.to_string() == "true" { "Yes" } else { "No" })
}

/// `super_admin` as `Super admin`.
#[askama::filter_fn]
pub fn humanize(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(humanize_str(&value.to_string()))
}

fn humanize_str(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_str() {
        assert_eq!(humanize_str("super_admin"), "Super admin");
        assert_eq!(humanize_str("pending"), "Pending");
        assert_eq!(humanize_str(""), "");
    }
}
