//! Contact form route handlers.
//!
//! Submissions are validated and stored in `contact_submissions`, where the
//! back office inbox picks them up.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use timberline_core::Table;
use timberline_core::content::ContactMessage;
use timberline_realtime::TableClient;

use crate::error::Result;
use crate::filters;
use crate::state::AppState;

/// Contact form data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "contact/show.html")]
pub struct ContactTemplate {
    pub form: ContactForm,
    pub error: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "contact/thanks.html")]
pub struct ContactThanksTemplate {
    pub name: String,
}

/// Display the contact form.
pub async fn show() -> impl IntoResponse {
    ContactTemplate {
        form: ContactForm::default(),
        error: None,
    }
}

/// Store a contact submission.
///
/// # Errors
///
/// Returns an error if the backend write fails.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn submit(State(state): State<AppState>, Form(form): Form<ContactForm>) -> Result<Response> {
    let message = match ContactMessage::validate(
        &form.name,
        &form.email,
        Some(form.subject.as_str()),
        &form.message,
    ) {
        Ok(message) => message,
        Err(e) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                ContactTemplate {
                    form,
                    error: Some(e.to_string()),
                },
            )
                .into_response());
        }
    };

    let record = serde_json::to_value(&message)
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    state.tables().insert(Table::ContactSubmissions, record).await?;
    tracing::info!("contact submission stored");

    Ok(ContactThanksTemplate { name: message.name }.into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use timberline_realtime::memory::MemoryBackend;

    use super::*;
    use crate::state::test_support;

    fn form(email: &str) -> ContactForm {
        ContactForm {
            name: "Grace".to_string(),
            email: email.to_string(),
            subject: "Sofa delivery".to_string(),
            message: "When will my sofa arrive?".to_string(),
        }
    }

    #[tokio::test]
    async fn test_valid_submission_is_stored() {
        let backend = MemoryBackend::new();
        let state = test_support::state(&backend);

        let response = submit(State(state), Form(form("grace@example.com"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rows = backend.rows(Table::ContactSubmissions);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.first().unwrap()["subject"], "Sofa delivery");
        assert_eq!(rows.first().unwrap()["handled"], false);
    }

    #[tokio::test]
    async fn test_invalid_email_rerenders_form() {
        let backend = MemoryBackend::new();
        let state = test_support::state(&backend);

        let response = submit(State(state), Form(form("grace"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(backend.rows(Table::ContactSubmissions).is_empty());
    }
}
