//! Staff authentication error types.

use thiserror::Error;

use timberline_realtime::BackendError;

/// Errors that can occur during staff authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("{0}")]
    InvalidEmail(#[from] timberline_core::EmailError),

    /// Unknown email, wrong password, or a deactivated account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// A staff account with this email already exists.
    #[error("a staff account with this email already exists")]
    AlreadyExists,

    /// Password does not meet requirements.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Password hashing failed.
    #[error("password hashing failed")]
    PasswordHash,

    /// Session store read or write failed.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Remote table call failed.
    #[error("backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        if err.is_conflict() {
            Self::AlreadyExists
        } else {
            Self::Backend(err)
        }
    }
}
