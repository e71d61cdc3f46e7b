//! Contact form inbox.

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use timberline_core::content::ContactSubmission;
use timberline_core::{ContactSubmissionId, Table};
use timberline_realtime::{Query as TableQuery, TableClientExt};

use crate::error::Result;
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, StaffView, render};
use crate::state::AppState;

/// `?all=true` includes handled messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub all: bool,
}

/// Inbox template.
#[derive(Template)]
#[template(path = "inbox/index.html")]
pub struct InboxTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub messages: Vec<ContactSubmission>,
    pub show_all: bool,
    pub error: Option<&'static str>,
}

/// Contact submissions, newest first. Unhandled only unless `?all=true`.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> Html<String> {
    let mut select = TableQuery::new();
    if !query.all {
        select = select.eq("handled", false);
    }
    let select = select.order_by("created_at", false);

    let (messages, error) = match state
        .tables()
        .fetch::<ContactSubmission>(Table::ContactSubmissions, &select)
        .await
    {
        Ok(messages) => (messages, None),
        Err(e) => {
            tracing::error!("Failed to fetch contact submissions: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    render(&InboxTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/inbox".to_string(),
        messages,
        show_all: query.all,
        error,
    })
}

/// Mark a message handled.
///
/// # Errors
///
/// Returns `NotFound` for an unknown message.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn mark_handled(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Path(id): Path<ContactSubmissionId>,
) -> Result<Redirect> {
    let _: ContactSubmission = state
        .tables()
        .modify(Table::ContactSubmissions, id.into(), &json!({ "handled": true }))
        .await?;
    tracing::info!(submission_id = %id, "contact submission handled");
    Ok(Redirect::to("/inbox"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use timberline_core::StaffRole;
    use timberline_realtime::BackendError;
    use timberline_realtime::memory::MemoryBackend;

    use super::*;
    use crate::error::AppError;
    use crate::state::test_support;

    async fn editor(backend: &MemoryBackend) -> (AppState, Authorized<require::ManageContent>) {
        let state = test_support::state(backend);
        let (_, staff) = test_support::signed_in(backend, StaffRole::Admin).await;
        let auth = Authorized::verify(&state, staff).await.unwrap();
        (state, auth)
    }

    #[tokio::test]
    async fn test_handled_messages_leave_the_inbox() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::ContactSubmissions,
                [json!({"id": 1, "name": "Grace", "email": "grace@example.com", "message": "Is the oak desk in stock?"})],
            )
            .unwrap();

        let (state, auth) = editor(&backend).await;
        let Html(body) = index(auth, State(state.clone()), Query(InboxQuery::default())).await;
        assert!(body.contains("Is the oak desk in stock?"));

        let (_, auth) = editor(&backend).await;
        mark_handled(auth, State(state.clone()), Path(ContactSubmissionId::new(1)))
            .await
            .unwrap();

        let (_, auth) = editor(&backend).await;
        let Html(body) = index(auth, State(state.clone()), Query(InboxQuery::default())).await;
        assert!(!body.contains("Is the oak desk in stock?"));

        let (_, auth) = editor(&backend).await;
        let Html(body) = index(auth, State(state), Query(InboxQuery { all: true })).await;
        assert!(body.contains("Is the oak desk in stock?"));
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_found() {
        let backend = MemoryBackend::new();
        let (state, auth) = editor(&backend).await;
        let result = mark_handled(auth, State(state), Path(ContactSubmissionId::new(9))).await;
        assert!(matches!(result, Err(AppError::Backend(BackendError::NotFound))));
    }
}
