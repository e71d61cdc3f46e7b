//! HTTP route handlers for the back office.
//!
//! Every handler below `/auth` takes an [`Authorized`](crate::middleware::Authorized)
//! extractor naming the capability it needs; the role behind it is fetched
//! from the backend per request.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness check
//! GET  /health/ready                - Readiness (backend reachable, open live streams)
//!
//! # Auth
//! GET  /auth/login                  - Sign-in form
//! POST /auth/login                  - Sign in
//! POST /auth/logout                 - Sign out
//!
//! # Dashboard (view_dashboard)
//! GET  /                            - Counts, recent orders, low stock
//!
//! # Products (manage_products)
//! GET  /products                    - Product list (query: q, category)
//! GET  /products/new                - New product form
//! POST /products                    - Create product
//! GET  /products/{id}/edit          - Edit form
//! POST /products/{id}               - Update product
//! POST /products/{id}/delete        - Delete product
//!
//! # Orders and customers (manage_orders)
//! GET  /orders                      - Order list (query: status)
//! GET  /orders/{id}                 - Order detail with line items
//! POST /orders/{id}/status          - Move to the next status
//! GET  /customers                   - Customer list (query: q)
//!
//! # Money (access_financials)
//! GET  /discounts                   - Discount codes
//! POST /discounts                   - Create code
//! POST /discounts/{id}/toggle       - Activate / deactivate
//! POST /discounts/{id}/delete       - Delete code
//! GET  /financials                  - Revenue summary
//!
//! # Content (manage_content)
//! GET  /content                     - Blog posts, FAQs, store locations
//! POST /content/blog                - New post
//! POST /content/blog/{id}/delete    - Delete post
//! POST /content/faqs                - New FAQ
//! POST /content/faqs/{id}/delete    - Delete FAQ
//! POST /content/stores              - New store location
//! POST /content/stores/{id}/delete  - Delete store location
//! GET  /inbox                       - Contact submissions
//! POST /inbox/{id}/handled          - Mark handled
//! GET  /newsletter                  - Subscribers
//!
//! # Staff (manage_users)
//! GET  /staff                       - Staff accounts
//! POST /staff                       - Create account
//! POST /staff/{id}/role             - Change role
//! POST /staff/{id}/deactivate       - Deactivate account
//!
//! # Live updates
//! GET  /live/{resource}             - SSE stream of refreshed rows and toasts
//! ```

pub mod auth;
pub mod content;
pub mod customers;
pub mod dashboard;
pub mod discounts;
pub mod financials;
pub mod inbox;
pub mod live;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod staff;

use std::str::FromStr;

use askama::Template;
use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;

use timberline_core::{Price, StaffRole};
use timberline_core::authz::Capability;

use crate::models::CurrentStaff;
use crate::state::AppState;

/// Banner shown when a list could not be loaded.
pub const LOAD_ERROR: &str = "Could not load this list. Try again shortly.";

/// Products at or below this stock count are flagged.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// One sidebar entry.
#[derive(Debug, Clone)]
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
}

const NAV: [(Capability, &str, &str); 10] = [
    (Capability::ViewDashboard, "/", "Dashboard"),
    (Capability::ManageProducts, "/products", "Products"),
    (Capability::ManageOrders, "/orders", "Orders"),
    (Capability::ManageOrders, "/customers", "Customers"),
    (Capability::AccessFinancials, "/discounts", "Discounts"),
    (Capability::AccessFinancials, "/financials", "Financials"),
    (Capability::ManageContent, "/content", "Content"),
    (Capability::ManageContent, "/inbox", "Inbox"),
    (Capability::ManageContent, "/newsletter", "Newsletter"),
    (Capability::ManageUsers, "/staff", "Staff"),
];

/// Signed-in staff member as shown in the layout.
///
/// Built from the role verified for the current request, so the sidebar only
/// offers what the backend would allow right now.
#[derive(Debug, Clone)]
pub struct StaffView {
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    pub nav: Vec<NavLink>,
}

impl StaffView {
    #[must_use]
    pub fn new(staff: &CurrentStaff, role: StaffRole) -> Self {
        let nav = NAV
            .iter()
            .filter(|(capability, _, _)| role.allows(*capability))
            .map(|&(_, href, label)| NavLink { href, label })
            .collect();

        Self {
            name: staff.name.clone(),
            email: staff.email.to_string(),
            role,
            nav,
        }
    }
}

/// Flash-style message carried in a redirect's query string.
#[derive(Debug, Default, Deserialize)]
pub struct Notice {
    pub notice: Option<String>,
}

/// Trimmed form value, `None` when blank.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A dollar amount greater than zero.
#[must_use]
pub fn parse_price(raw: &str) -> Option<Price> {
    let amount = Decimal::from_str(raw.trim().trim_start_matches('$')).ok()?;
    (amount > Decimal::ZERO).then(|| Price::new(amount.round_dp(2)))
}

/// Lowercase ASCII letters and digits joined by single dashes.
#[must_use]
pub fn slugify(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Render a template, logging failures.
pub fn render(template: &impl Template) -> Html<String> {
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

/// Sign-in routes (no session required).
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(auth::login_page).post(auth::login))
        .route("/auth/logout", post(auth::logout))
}

/// Catalog, order, and customer routes.
pub fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index).post(products::create))
        .route("/products/new", get(products::new_page))
        .route("/products/{id}", post(products::update))
        .route("/products/{id}/edit", get(products::edit_page))
        .route("/products/{id}/delete", post(products::delete))
        .route("/orders", get(orders::index))
        .route("/orders/{id}", get(orders::show))
        .route("/orders/{id}/status", post(orders::update_status))
        .route("/customers", get(customers::index))
}

/// Discount and reporting routes.
pub fn money_routes() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(discounts::index).post(discounts::create))
        .route("/discounts/{id}/toggle", post(discounts::toggle))
        .route("/discounts/{id}/delete", post(discounts::delete))
        .route("/financials", get(financials::index))
}

/// Content, inbox, and newsletter routes.
pub fn content_routes() -> Router<AppState> {
    Router::new()
        .route("/content", get(content::index))
        .route("/content/blog", post(content::create_post))
        .route("/content/blog/{id}/delete", post(content::delete_post))
        .route("/content/faqs", post(content::create_faq))
        .route("/content/faqs/{id}/delete", post(content::delete_faq))
        .route("/content/stores", post(content::create_store))
        .route("/content/stores/{id}/delete", post(content::delete_store))
        .route("/inbox", get(inbox::index))
        .route("/inbox/{id}/handled", post(inbox::mark_handled))
        .route("/newsletter", get(newsletter::index))
}

/// Staff management routes.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        .route("/staff", get(staff::index).post(staff::create))
        .route("/staff/{id}/role", post(staff::set_role))
        .route("/staff/{id}/deactivate", post(staff::deactivate))
}

/// Every back-office route.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::dashboard))
        .merge(auth_routes())
        .merge(store_routes())
        .merge(money_routes())
        .merge(content_routes())
        .merge(staff_routes())
        .route("/live/{resource}", get(live::stream))
}
