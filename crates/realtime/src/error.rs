//! Backend error type shared by every collaborator.

use thiserror::Error;

/// Errors from the table client or change feed.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row could not be decoded into the expected shape.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested row was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A column or function name failed validation.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Insert and update payloads must be JSON objects.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The change feed could not open a subscription.
    #[error("subscription failed: {0}")]
    Subscribe(String),
}

impl BackendError {
    /// Map a sqlx error, turning constraint violations into [`BackendError::Conflict`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db)
                if db.is_unique_violation() || db.is_foreign_key_violation() =>
            {
                Self::Conflict(db.message().to_string())
            }
            other => Self::Database(other),
        }
    }

    /// `true` for a duplicate-key style failure.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Check that `name` is a plain lower-case SQL identifier.
///
/// # Errors
///
/// Returns [`BackendError::InvalidIdentifier`] for anything else.
pub fn validate_identifier(name: &str) -> Result<&str, BackendError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(name)
    } else {
        Err(BackendError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("price").is_ok());
        assert!(validate_identifier("_tmp2").is_ok());
        assert!(validate_identifier("compare_at_price").is_ok());

        for bad in ["", "2col", "Price", "price; drop table", "a-b", "\"x\""] {
            assert!(
                matches!(
                    validate_identifier(bad),
                    Err(BackendError::InvalidIdentifier(_))
                ),
                "{bad} should be rejected"
            );
        }
    }
}
