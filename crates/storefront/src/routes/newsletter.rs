//! Newsletter signup.
//!
//! Signing up twice is not an error: a duplicate email reports success, since
//! the address is already on the list.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use timberline_core::{Email, Table};
use timberline_realtime::TableClient;

use crate::error::Result;
use crate::filters;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeForm {
    pub email: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "newsletter/result.html")]
pub struct SubscribeTemplate {
    pub email: String,
    pub error: Option<String>,
}

/// Subscribe an email address.
///
/// # Errors
///
/// Returns an error if the backend write fails for a reason other than a duplicate.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn subscribe(State(state): State<AppState>, Form(form): Form<SubscribeForm>) -> Result<Response> {
    let email = match Email::parse(&form.email) {
        Ok(email) => email,
        Err(e) => {
            return Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                SubscribeTemplate {
                    email: form.email,
                    error: Some(e.to_string()),
                },
            )
                .into_response());
        }
    };

    match state
        .tables()
        .insert(Table::NewsletterSubscribers, json!({ "email": email }))
        .await
    {
        Ok(_) => tracing::info!("newsletter subscription added"),
        Err(e) if e.is_conflict() => tracing::info!("email already subscribed"),
        Err(e) => return Err(e.into()),
    }

    Ok(SubscribeTemplate {
        email: email.into_inner(),
        error: None,
    }
    .into_response())
}
