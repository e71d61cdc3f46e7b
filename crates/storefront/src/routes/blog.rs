//! The journal: `/blog` and `/blog/{slug}`.
//!
//! Both pages read the cached list of published posts, newest first.

use std::sync::Arc;

use askama::Template;
use askama_web::WebTemplate;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use tracing::instrument;

use timberline_core::content::BlogPost;

use crate::error::{AppError, Result};
use crate::filters;
use crate::routes::LOAD_ERROR;
use crate::state::AppState;

/// Further reading listed under a post.
const MORE_POSTS: usize = 3;

#[derive(Template, WebTemplate)]
#[template(path = "blog/index.html")]
pub struct BlogIndexTemplate {
    pub posts: Arc<Vec<BlogPost>>,
    pub notice: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "blog/show.html")]
pub struct BlogShowTemplate {
    pub post: BlogPost,
    pub recent_posts: Vec<BlogPost>,
}

/// A failed load still renders the page, empty, with a notice.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> BlogIndexTemplate {
    let (posts, notice) = match state.content().published_posts().await {
        Ok(posts) => (posts, None),
        Err(e) => {
            tracing::warn!(error = %e, "blog posts unavailable");
            (Arc::default(), Some(LOAD_ERROR))
        }
    };
    BlogIndexTemplate { posts, notice }
}

/// # Errors
///
/// 404 for a slug that is unknown or not yet published.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> Result<BlogShowTemplate> {
    let posts = state.content().published_posts().await?;
    let (post, recent_posts) =
        with_recent(&posts, &slug).ok_or_else(|| AppError::NotFound(format!("post {slug}")))?;
    Ok(BlogShowTemplate { post, recent_posts })
}

/// The post at `slug` and the newest few others.
fn with_recent(posts: &[BlogPost], slug: &str) -> Option<(BlogPost, Vec<BlogPost>)> {
    let post = posts.iter().find(|p| p.slug == slug)?.clone();
    let recent = posts.iter().filter(|p| p.slug != slug).take(MORE_POSTS).cloned().collect();
    Some((post, recent))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index)).route("/{slug}", get(show))
}
