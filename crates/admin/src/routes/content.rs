//! Blog, FAQ, and store location management.
//!
//! One page lists all three with an add form under each. The storefront
//! caches these tables and drops its cache entries when they change, so a
//! create or delete here shows up on the shop without a restart.

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use timberline_core::content::{BlogPost, Faq, StoreLocation};
use timberline_core::{BlogPostId, FaqId, StoreLocationId, Table};
use timberline_realtime::{BackendError, Query as TableQuery, TableClient, TableClientExt};

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, Notice, StaffView, non_blank, render, slugify};
use crate::state::AppState;

/// Content page template.
#[derive(Template)]
#[template(path = "content/index.html")]
pub struct ContentTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub posts: Vec<BlogPost>,
    pub faqs: Vec<Faq>,
    pub stores: Vec<StoreLocation>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

/// New blog post.
#[derive(Debug, Deserialize)]
pub struct PostForm {
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    pub body: String,
    pub published: Option<String>,
}

#[derive(Debug, Serialize)]
struct PostRecord {
    slug: String,
    title: String,
    excerpt: String,
    body: String,
    published: bool,
    published_at: Option<DateTime<Utc>>,
}

impl PostForm {
    fn validate(&self, now: DateTime<Utc>) -> std::result::Result<PostRecord, String> {
        let title = non_blank(Some(&self.title)).ok_or("Title is required.")?;
        let body = non_blank(Some(&self.body)).ok_or("Body is required.")?;
        let slug = slugify(non_blank(Some(&self.slug)).unwrap_or(title));
        if slug.is_empty() {
            return Err("Slug must contain letters or digits.".to_string());
        }
        let published = self.published.is_some();

        Ok(PostRecord {
            slug,
            title: title.to_string(),
            excerpt: self.excerpt.trim().to_string(),
            body: body.to_string(),
            published,
            published_at: published.then_some(now),
        })
    }
}

/// New FAQ entry.
#[derive(Debug, Deserialize)]
pub struct FaqForm {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Serialize)]
struct FaqRecord {
    question: String,
    answer: String,
    position: i32,
}

impl FaqForm {
    fn validate(&self) -> std::result::Result<FaqRecord, String> {
        let question = non_blank(Some(&self.question)).ok_or("Question is required.")?;
        let answer = non_blank(Some(&self.answer)).ok_or("Answer is required.")?;
        let position = match non_blank(Some(&self.position)) {
            Some(raw) => raw.parse().map_err(|_| "Position must be a whole number.")?,
            None => 0,
        };
        Ok(FaqRecord {
            question: question.to_string(),
            answer: answer.to_string(),
            position,
        })
    }
}

/// New store location.
#[derive(Debug, Deserialize)]
pub struct StoreForm {
    pub name: String,
    pub address: String,
    pub city: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub hours: String,
}

#[derive(Debug, Serialize)]
struct StoreRecord {
    name: String,
    address: String,
    city: String,
    phone: Option<String>,
    hours: Option<String>,
}

impl StoreForm {
    fn validate(&self) -> std::result::Result<StoreRecord, String> {
        let name = non_blank(Some(&self.name)).ok_or("Name is required.")?;
        let address = non_blank(Some(&self.address)).ok_or("Address is required.")?;
        let city = non_blank(Some(&self.city)).ok_or("City is required.")?;
        Ok(StoreRecord {
            name: name.to_string(),
            address: address.to_string(),
            city: city.to_string(),
            phone: non_blank(Some(&self.phone)).map(String::from),
            hours: non_blank(Some(&self.hours)).map(String::from),
        })
    }
}

async fn page(
    auth: &Authorized<require::ManageContent>,
    state: &AppState,
    notice: Option<String>,
    error: Option<String>,
) -> Html<String> {
    let tables = state.tables();
    let posts_query = TableQuery::new().order_by("id", false);
    let faqs_query = TableQuery::new().order_by("position", true);
    let stores_query = TableQuery::new().order_by("city", true);

    let (posts, faqs, stores) = tokio::join!(
        tables.fetch::<BlogPost>(Table::BlogPosts, &posts_query),
        tables.fetch::<Faq>(Table::Faqs, &faqs_query),
        tables.fetch::<StoreLocation>(Table::StoreLocations, &stores_query),
    );

    let (posts, faqs, stores, load_error) = match (posts, faqs, stores) {
        (Ok(posts), Ok(faqs), Ok(stores)) => (posts, faqs, stores, None),
        (posts, faqs, stores) => {
            for e in [posts.err(), faqs.err(), stores.err()].into_iter().flatten() {
                tracing::error!("Failed to fetch content: {e}");
            }
            (vec![], vec![], vec![], Some(LOAD_ERROR.to_string()))
        }
    };

    render(&ContentTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/content".to_string(),
        posts,
        faqs,
        stores,
        notice,
        error: error.or(load_error),
    })
}

async fn rejected(
    auth: &Authorized<require::ManageContent>,
    state: &AppState,
    status: StatusCode,
    message: String,
) -> Response {
    (status, page(auth, state, None, Some(message)).await).into_response()
}

/// Insert `record`, re-rendering the page on validation or uniqueness problems.
async fn insert_or_reject<R: Serialize + Sync>(
    auth: &Authorized<require::ManageContent>,
    state: &AppState,
    table: Table,
    record: std::result::Result<R, String>,
    notice: &str,
) -> Result<Response> {
    let record = match record {
        Ok(record) => record,
        Err(message) => return Ok(rejected(auth, state, StatusCode::UNPROCESSABLE_ENTITY, message).await),
    };

    match state.tables().create::<serde_json::Value, _>(table, &record).await {
        Ok(row) => {
            tracing::info!(%table, id = %row["id"], "content created");
            Ok(Redirect::to(&format!("/content?notice={notice}")).into_response())
        }
        Err(BackendError::Conflict(_)) => Ok(rejected(
            auth,
            state,
            StatusCode::CONFLICT,
            "That slug is already taken.".to_string(),
        )
        .await),
        Err(e) => Err(e.into()),
    }
}

async fn remove(tables: &dyn TableClient, table: Table, id: i32) -> Result<Redirect> {
    tables.delete(table, id.into()).await.map_err(|e| match e {
        BackendError::NotFound => AppError::NotFound(format!("{table} {id}")),
        other => other.into(),
    })?;
    tracing::info!(%table, id, "content deleted");
    Ok(Redirect::to("/content?notice=Deleted"))
}

/// Content page.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Query(notice): Query<Notice>,
) -> Html<String> {
    page(&auth, &state, notice.notice, None).await
}

/// Create a blog post.
///
/// # Errors
///
/// Returns the backend error for anything other than a duplicate slug.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id))]
pub async fn create_post(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Form(form): Form<PostForm>,
) -> Result<Response> {
    let record = form.validate(Utc::now());
    insert_or_reject(&auth, &state, Table::BlogPosts, record, "Post+created").await
}

/// Delete a blog post.
///
/// # Errors
///
/// Returns `NotFound` for an unknown post.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn delete_post(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Path(id): Path<BlogPostId>,
) -> Result<Redirect> {
    remove(state.tables(), Table::BlogPosts, id.as_i32()).await
}

/// Create an FAQ entry.
///
/// # Errors
///
/// Returns the backend error if the insert fails.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id))]
pub async fn create_faq(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Form(form): Form<FaqForm>,
) -> Result<Response> {
    insert_or_reject(&auth, &state, Table::Faqs, form.validate(), "FAQ+added").await
}

/// Delete an FAQ entry.
///
/// # Errors
///
/// Returns `NotFound` for an unknown entry.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn delete_faq(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Path(id): Path<FaqId>,
) -> Result<Redirect> {
    remove(state.tables(), Table::Faqs, id.as_i32()).await
}

/// Create a store location.
///
/// # Errors
///
/// Returns the backend error if the insert fails.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id))]
pub async fn create_store(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Form(form): Form<StoreForm>,
) -> Result<Response> {
    insert_or_reject(&auth, &state, Table::StoreLocations, form.validate(), "Store+added").await
}

/// Delete a store location.
///
/// # Errors
///
/// Returns `NotFound` for an unknown location.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn delete_store(
    auth: Authorized<require::ManageContent>,
    State(state): State<AppState>,
    Path(id): Path<StoreLocationId>,
) -> Result<Redirect> {
    remove(state.tables(), Table::StoreLocations, id.as_i32()).await
}
