//! Handler errors for the back office.
//!
//! Authentication and role failures never get here: the extractors in
//! [`crate::middleware::auth`] reject those requests before a handler runs.
//! What remains is bad input, missing rows and backend trouble.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use timberline_realtime::BackendError;

use crate::services::auth::AuthError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The message is shown to staff as-is.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The row changed since it was read. Shown to staff as-is.
    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::Backend(BackendError::NotFound) => StatusCode::NOT_FOUND,
            Self::Conflict(_)
            | Self::Backend(BackendError::Conflict(_))
            | Self::Auth(AuthError::AlreadyExists) => StatusCode::CONFLICT,
            Self::BadRequest(_)
            | Self::Backend(BackendError::InvalidRecord(_))
            | Self::Auth(AuthError::InvalidEmail(_) | AuthError::WeakPassword(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            Self::Backend(_) | Self::Auth(_) | Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What staff see. Server-side detail stays in the logs.
    fn public_message(self) -> String {
        match self {
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(reason) | Self::Conflict(reason) => reason,
            Self::Backend(BackendError::NotFound) => "Not found".to_owned(),
            Self::Backend(BackendError::Conflict(_)) => "That conflicts with an existing record".to_owned(),
            Self::Backend(BackendError::InvalidRecord(reason)) => reason,
            Self::Auth(
                err @ (AuthError::InvalidEmail(_)
                | AuthError::WeakPassword(_)
                | AuthError::AlreadyExists
                | AuthError::InvalidCredentials),
            ) => err.to_string(),
            Self::Backend(_) | Self::Auth(_) | Self::Session(_) => "Internal server error".to_owned(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "admin request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "admin request rejected");
        }

        (status, self.public_message()).into_response()
    }
}

/// Tag Sentry events on this request with the signed-in staff member.
pub fn set_sentry_user(staff_id: i32, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(staff_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| scope.set_user(None));
}
