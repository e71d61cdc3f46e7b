//! Sign-in and sign-out.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{Result, clear_sentry_user};
use crate::services::auth::{AuthError, StaffAuthService, current_staff, sign_out, start_session};
use crate::state::AppState;

/// Sign-in form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub email: String,
    pub error: Option<String>,
}

/// Show the sign-in form, or skip it for an existing session.
pub async fn login_page(session: Session) -> Response {
    if current_staff(&session).await.is_some() {
        return Redirect::to("/").into_response();
    }
    LoginTemplate {
        email: String::new(),
        error: None,
    }
    .into_response()
}

/// Check credentials and start a session.
///
/// # Errors
///
/// Returns an error if the backend or session store fails. Bad credentials
/// re-render the form with a 401.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let staff = match StaffAuthService::new(state.tables())
        .sign_in(&form.email, &form.password)
        .await
    {
        Ok(staff) => staff,
        Err(AuthError::InvalidCredentials) => {
            tracing::info!("sign-in rejected");
            let page = LoginTemplate {
                email: form.email,
                error: Some("Invalid email or password.".to_string()),
            };
            return Ok((StatusCode::UNAUTHORIZED, page).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    start_session(&session, &staff).await?;
    tracing::info!(staff_id = %staff.id, "staff signed in");

    Ok(Redirect::to("/").into_response())
}

/// End the session.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn logout(session: Session) -> Result<Redirect> {
    if let Some(staff) = current_staff(&session).await {
        tracing::info!(staff_id = %staff.id, "staff signed out");
    }
    sign_out(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/auth/login"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use timberline_core::StaffRole;
    use timberline_realtime::memory::MemoryBackend;
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::state::test_support;

    async fn backend_with_staff() -> MemoryBackend {
        let backend = MemoryBackend::new();
        StaffAuthService::new(&backend)
            .create_staff("ada@timberline.example", "Ada", StaffRole::Manager, "correct horse battery")
            .await
            .unwrap();
        backend
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    fn form(password: &str) -> Form<LoginForm> {
        Form(LoginForm {
            email: "ADA@timberline.example".to_string(),
            password: password.to_string(),
        })
    }

    #[tokio::test]
    async fn test_login_starts_session() {
        let backend = backend_with_staff().await;
        let session = session();

        let response = login(State(test_support::state(&backend)), session.clone(), form("correct horse battery"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let staff = current_staff(&session).await.unwrap();
        assert_eq!(staff.email.as_str(), "ada@timberline.example");
    }

    #[tokio::test]
    async fn test_wrong_password_is_401_without_session() {
        let backend = backend_with_staff().await;
        let session = session();

        let response = login(State(test_support::state(&backend)), session.clone(), form("wrong password!!"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(current_staff(&session).await.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let backend = MemoryBackend::new();
        let (session, _) = test_support::signed_in(&backend, StaffRole::Support).await;

        logout(session.clone()).await.unwrap();
        assert!(current_staff(&session).await.is_none());
    }
}
