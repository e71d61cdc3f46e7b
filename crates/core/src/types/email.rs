//! Normalized email addresses.
//!
//! Shoppers, newsletter subscribers and staff are all looked up by email, so
//! every address is trimmed and lowercased on the way in.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Why an address was rejected. The messages are shown next to form fields.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("Please enter an email address.")]
    Empty,
    #[error("Email addresses are limited to {max} characters.")]
    TooLong { max: usize },
    #[error("Email addresses cannot contain spaces.")]
    ContainsWhitespace,
    #[error("Email addresses need exactly one @.")]
    InvalidAtSymbol,
    #[error("Something is missing before the @.")]
    EmptyLocalPart,
    #[error("That email domain doesn't look right.")]
    InvalidDomain,
}

/// A trimmed, lowercased email address.
///
/// ## Examples
///
/// ```
/// use timberline_core::Email;
///
/// let email = Email::parse("  Jane.Doe@Example.COM ").unwrap();
/// assert_eq!(email.as_str(), "jane.doe@example.com");
///
/// assert!(Email::parse("").is_err());
/// assert!(Email::parse("no-at-symbol").is_err());
/// assert!(Email::parse("two@@example.com").is_err());
/// assert!(Email::parse("user@localhost").is_err());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// # Errors
    ///
    /// Returns the first [`EmailError`] the input runs into.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let address = s.trim();
        match address.len() {
            0 => return Err(EmailError::Empty),
            n if n > Self::MAX_LENGTH => {
                return Err(EmailError::TooLong { max: Self::MAX_LENGTH });
            }
            _ => {}
        }
        if address.contains(char::is_whitespace) {
            return Err(EmailError::ContainsWhitespace);
        }

        let Some((local, domain)) = address.split_once('@').filter(|(_, d)| !d.contains('@')) else {
            return Err(EmailError::InvalidAtSymbol);
        };
        if local.is_empty() {
            return Err(EmailError::EmptyLocalPart);
        }
        let mut labels = domain.split('.');
        if labels.clone().count() < 2 || labels.any(str::is_empty) {
            return Err(EmailError::InvalidDomain);
        }

        Ok(Self(address.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Everything after the `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Rows coming back from the backend are re-validated rather than trusted.
impl<'de> Deserialize<'de> for Email {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let email = Email::parse(" Orders@Timberline.Example\n").unwrap();
        assert_eq!(email.as_str(), "orders@timberline.example");
        assert_eq!(email.domain(), "timberline.example");
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
        assert_eq!(Email::parse("a b@c.com"), Err(EmailError::ContainsWhitespace));
        assert_eq!(Email::parse("abc.com"), Err(EmailError::InvalidAtSymbol));
        assert_eq!(Email::parse("a@b@c.com"), Err(EmailError::InvalidAtSymbol));
        assert_eq!(Email::parse("@c.com"), Err(EmailError::EmptyLocalPart));
        assert_eq!(Email::parse("a@com"), Err(EmailError::InvalidDomain));
        assert_eq!(Email::parse("a@c..com"), Err(EmailError::InvalidDomain));
    }

    #[test]
    fn test_parse_too_long() {
        let long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            Email::parse(&long),
            Err(EmailError::TooLong { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Email = serde_json::from_str("\"Buyer@Shop.Example\"").unwrap();
        assert_eq!(ok.as_str(), "buyer@shop.example");
        assert!(serde_json::from_str::<Email>("\"not-an-email\"").is_err());
    }
}
