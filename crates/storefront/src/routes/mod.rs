//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page (featured + bestsellers)
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness (catalog loaded, live mirror subscribed)
//!
//! # Catalog (query: category, min_price, max_price, min_rating, sort)
//! GET  /shop                   - Every product
//! GET  /bestsellers            - Bestselling products
//! GET  /products/{slug}        - Product detail with related products
//!
//! # Content
//! GET  /blog                   - Published posts
//! GET  /blog/{slug}            - Post detail
//! GET  /faq                    - Frequently asked questions
//! GET  /stores                 - Showroom locations
//! GET  /contact                - Contact form
//! POST /contact                - Submit contact form
//! POST /newsletter             - Newsletter signup
//!
//! # Cart (session)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add a product
//! POST /cart/update            - Change a quantity (0 removes)
//! POST /cart/remove            - Remove a line
//!
//! # Checkout
//! GET  /checkout               - Checkout form
//! POST /checkout               - Place the order
//! GET  /checkout/complete      - Confirmation for this session's order
//! ```

pub mod blog;
pub mod cart;
pub mod checkout;
pub mod contact;
pub mod home;
pub mod newsletter;
pub mod pages;
pub mod products;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Banner shown when a list could not be loaded.
pub const LOAD_ERROR: &str = "Something went wrong loading this page. Please try again shortly.";

/// Catalog routes.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/shop", get(products::shop))
        .route("/bestsellers", get(products::bestsellers))
        .route("/products/{slug}", get(products::show))
}

/// Cart and checkout routes.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show))
        .route("/cart/add", post(cart::add))
        .route("/cart/update", post(cart::update))
        .route("/cart/remove", post(cart::remove))
        .route("/checkout", get(checkout::show).post(checkout::submit))
        .route("/checkout/complete", get(checkout::complete))
}

/// Content and inbound-message routes.
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .nest("/blog", blog::router())
        .route("/faq", get(pages::faq))
        .route("/stores", get(pages::stores))
        .route("/contact", get(contact::show).post(contact::submit))
        .route("/newsletter", post(newsletter::subscribe))
}

/// Every storefront route.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .merge(product_routes())
        .merge(cart_routes())
        .merge(content_routes())
}
