//! Newsletter subscriber list.

use askama::Template;
use axum::{extract::State, response::Html};
use tracing::instrument;

use timberline_core::Table;
use timberline_core::content::NewsletterSubscriber;
use timberline_realtime::{Query, TableClientExt};

use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, StaffView, render};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "newsletter/index.html")]
pub struct NewsletterTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub subscribers: Vec<NewsletterSubscriber>,
    pub error: Option<&'static str>,
}

/// Subscribers, newest first.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
) -> Html<String> {
    let select = Query::new().order_by("subscribed_at", false);
    let (subscribers, error) = match state
        .tables()
        .fetch::<NewsletterSubscriber>(Table::NewsletterSubscribers, &select)
        .await
    {
        Ok(subscribers) => (subscribers, None),
        Err(e) => {
            tracing::error!("Failed to fetch newsletter subscribers: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    render(&NewsletterTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/newsletter".to_string(),
        subscribers,
        error,
    })
}
