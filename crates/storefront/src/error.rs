//! Handler errors for the storefront.
//!
//! Shoppers only ever see a short message. Anything that is our fault is sent
//! to Sentry and logged with the event id so the two can be matched up.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use timberline_realtime::BackendError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A cached content load failed. Every request waiting on it gets the same error.
    #[error("Content load failed: {0}")]
    Content(#[from] Arc<BackendError>),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::Backend(BackendError::NotFound) => StatusCode::NOT_FOUND,
            Self::Backend(BackendError::Conflict(_)) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Backend(_) | Self::Content(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "request failed");
        }

        let message = match self {
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(reason) => reason,
            Self::Backend(BackendError::NotFound) => "Not found".to_owned(),
            Self::Backend(BackendError::Conflict(_)) => "That request conflicts with existing data".to_owned(),
            Self::Backend(_) | Self::Content(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_owned()
            }
        };
        (status, message).into_response()
    }
}

/// Record a shopper action as a Sentry breadcrumb.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let data = data
        .unwrap_or_default()
        .iter()
        .map(|(key, value)| ((*key).to_owned(), serde_json::Value::from(*value)))
        .collect();

    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_owned()),
        message: Some(message.to_owned()),
        level: sentry::Level::Info,
        data,
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_shopper_facing_statuses() {
        assert_eq!(status_of(AppError::NotFound("product 12".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AppError::BadRequest("x".to_string())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AppError::Backend(BackendError::NotFound)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(AppError::Backend(BackendError::Conflict("slug".to_string()))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_server_failures() {
        assert_eq!(
            status_of(AppError::Backend(BackendError::DataCorruption("bad row".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let shared = Arc::new(BackendError::NotFound);
        assert_eq!(status_of(AppError::Content(shared)), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(AppError::Internal("boom".to_string()).status().is_server_error());
    }
}
