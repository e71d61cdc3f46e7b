//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use timberline_core::catalog::Product;

use crate::filters;
use crate::state::AppState;

/// Products per home page row.
const ROW_SIZE: usize = 4;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub featured: Vec<Product>,
    pub bestsellers: Vec<Product>,
}

impl HomeTemplate {
    fn build(products: &[Product]) -> Self {
        let pick = |keep: fn(&Product) -> bool| -> Vec<Product> {
            products
                .iter()
                .filter(|p| keep(p))
                .take(ROW_SIZE)
                .cloned()
                .collect()
        };
        Self {
            featured: pick(|p| p.featured),
            bestsellers: pick(|p| p.bestseller),
        }
    }
}

/// Display the home page.
#[instrument(skip(state))]
pub async fn home(State(state): State<AppState>) -> impl IntoResponse {
    HomeTemplate::build(&state.catalog().snapshot())
}
