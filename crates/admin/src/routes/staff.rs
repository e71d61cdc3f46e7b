//! Staff account management.

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use timberline_core::{StaffRole, StaffUserId, Table};
use timberline_realtime::{Query as TableQuery, TableClientExt};

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::models::StaffUser;
use crate::routes::{LOAD_ERROR, Notice, StaffView, render};
use crate::services::auth::{AuthError, MIN_PASSWORD_LENGTH, StaffAuthService};
use crate::state::AppState;

/// Staff page template.
#[derive(Template)]
#[template(path = "staff/index.html")]
pub struct StaffTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub accounts: Vec<StaffUser>,
    pub roles: [StaffRole; 4],
    pub form: NewStaffForm,
    pub min_password_length: usize,
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// New account form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStaffForm {
    pub email: String,
    pub name: String,
    pub role: String,
    /// Never echoed back into the form.
    #[serde(default)]
    pub password: String,
}

/// Role change form.
#[derive(Debug, Deserialize)]
pub struct RoleForm {
    pub role: String,
}

fn parse_role(raw: &str) -> Result<StaffRole> {
    StaffRole::from_str(raw.trim()).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn page(
    auth: &Authorized<require::ManageUsers>,
    state: &AppState,
    mut form: NewStaffForm,
    notice: Option<String>,
    error: Option<String>,
) -> Html<String> {
    form.password.clear();
    let select = TableQuery::new().order_by("name", true);
    let (accounts, load_error) = match state.tables().fetch::<StaffUser>(Table::StaffUsers, &select).await {
        Ok(accounts) => (accounts, None),
        Err(e) => {
            tracing::error!("Failed to fetch staff accounts: {e}");
            (vec![], Some(LOAD_ERROR.to_string()))
        }
    };

    render(&StaffTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/staff".to_string(),
        accounts,
        roles: StaffRole::ALL,
        form,
        min_password_length: MIN_PASSWORD_LENGTH,
        notice,
        error: error.or(load_error),
    })
}

/// Staff list with the new account form.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageUsers>,
    State(state): State<AppState>,
    Query(notice): Query<Notice>,
) -> Html<String> {
    page(&auth, &state, NewStaffForm::default(), notice.notice, None).await
}

/// Create an account.
///
/// # Errors
///
/// Returns an error for backend failures; input problems re-render the page.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id, email = %form.email))]
pub async fn create(
    auth: Authorized<require::ManageUsers>,
    State(state): State<AppState>,
    Form(form): Form<NewStaffForm>,
) -> Result<Response> {
    let role = parse_role(&form.role)?;
    let result = StaffAuthService::new(state.tables())
        .create_staff(&form.email, &form.name, role, &form.password)
        .await;

    let (status, message) = match result {
        Ok(created) => {
            tracing::info!(created_id = %created.id, %role, "staff account added");
            return Ok(Redirect::to("/staff?notice=Account+created").into_response());
        }
        Err(e @ (AuthError::InvalidEmail(_) | AuthError::WeakPassword(_))) => {
            (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(AuthError::AlreadyExists) => (
            StatusCode::CONFLICT,
            "An account with that email already exists.".to_string(),
        ),
        Err(e) => return Err(e.into()),
    };

    let body = page(&auth, &state, form, None, Some(message)).await;
    Ok((status, body).into_response())
}

/// Change an account's role. Takes effect on that person's next request.
///
/// # Errors
///
/// Returns `BadRequest` for an unknown role, `NotFound` for an unknown account.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id, role = %form.role))]
pub async fn set_role(
    auth: Authorized<require::ManageUsers>,
    State(state): State<AppState>,
    Path(id): Path<StaffUserId>,
    Form(form): Form<RoleForm>,
) -> Result<Redirect> {
    let role = parse_role(&form.role)?;
    if id == auth.staff.id && role != StaffRole::SuperAdmin {
        return Err(AppError::BadRequest(
            "You cannot remove your own staff management access".to_string(),
        ));
    }
    StaffAuthService::new(state.tables()).set_role(id, role).await?;
    tracing::info!(target_id = %id, %role, "staff role changed");
    Ok(Redirect::to("/staff?notice=Role+updated"))
}

/// Deactivate an account. Its open sessions stop authorizing immediately.
///
/// # Errors
///
/// Returns `BadRequest` when deactivating yourself, `NotFound` for an unknown account.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn deactivate(
    auth: Authorized<require::ManageUsers>,
    State(state): State<AppState>,
    Path(id): Path<StaffUserId>,
) -> Result<Redirect> {
    if id == auth.staff.id {
        return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
    }
    StaffAuthService::new(state.tables()).deactivate(id).await?;
    tracing::info!(target_id = %id, "staff account deactivated");
    Ok(Redirect::to("/staff?notice=Account+deactivated"))
}
