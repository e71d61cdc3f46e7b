//! FAQ and store-location pages.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use timberline_core::content::{Faq, StoreLocation};

use crate::filters;
use crate::routes::LOAD_ERROR;
use crate::state::AppState;

#[derive(Template, WebTemplate)]
#[template(path = "pages/faq.html")]
pub struct FaqTemplate {
    pub faqs: Vec<Faq>,
    pub notice: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "pages/stores.html")]
pub struct StoresTemplate {
    pub stores: Vec<StoreLocation>,
    pub notice: Option<String>,
}

#[instrument(skip(state))]
pub async fn faq(State(state): State<AppState>) -> impl IntoResponse {
    match state.content().faqs().await {
        Ok(faqs) => FaqTemplate {
            faqs: faqs.to_vec(),
            notice: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "faqs unavailable");
            FaqTemplate {
                faqs: Vec::new(),
                notice: Some(LOAD_ERROR.to_string()),
            }
        }
    }
}

#[instrument(skip(state))]
pub async fn stores(State(state): State<AppState>) -> impl IntoResponse {
    match state.content().stores().await {
        Ok(stores) => StoresTemplate {
            stores: stores.to_vec(),
            notice: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "store locations unavailable");
            StoresTemplate {
                stores: Vec::new(),
                notice: Some(LOAD_ERROR.to_string()),
            }
        }
    }
}
