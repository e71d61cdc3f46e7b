//! Dashboard route handler.

use askama::Template;
use axum::{extract::State, response::Html};
use tracing::instrument;

use timberline_core::Table;
use timberline_core::catalog::Product;
use timberline_core::content::Customer;
use timberline_core::order::Order;
use timberline_realtime::{BackendError, Query, TableClientExt};

use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, LOW_STOCK_THRESHOLD, StaffView, render};
use crate::state::AppState;

/// Headline numbers.
#[derive(Debug, Clone, Default)]
pub struct DashboardMetrics {
    pub products: usize,
    pub orders: usize,
    pub customers: usize,
    pub open_messages: usize,
}

/// Dashboard template.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub metrics: DashboardMetrics,
    pub recent_orders: Vec<Order>,
    pub low_stock: Vec<Product>,
    pub error: Option<&'static str>,
}

fn loaded<T>(what: &str, result: Result<Vec<T>, BackendError>, failed: &mut bool) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::error!("Failed to fetch {what}: {e}");
        *failed = true;
        vec![]
    })
}

/// Dashboard page handler.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn dashboard(
    auth: Authorized<require::ViewDashboard>,
    State(state): State<AppState>,
) -> Html<String> {
    let tables = state.tables();

    let all = Query::new();
    let recent_query = Query::new().order_by("created_at", false).limit(5);
    let open_query = Query::new().eq("handled", false);
    let product_query = Query::new().order_by("stock", true);

    let (products, orders, recent, customers, open) = tokio::join!(
        tables.fetch::<Product>(Table::Products, &product_query),
        tables.select(Table::Orders, &all),
        tables.fetch::<Order>(Table::Orders, &recent_query),
        tables.fetch::<Customer>(Table::Profiles, &all),
        tables.select(Table::ContactSubmissions, &open_query),
    );

    let mut failed = false;
    let products = loaded("products", products, &mut failed);
    let orders = loaded("orders", orders, &mut failed);
    let recent_orders = loaded("recent orders", recent, &mut failed);
    let customers = loaded("customers", customers, &mut failed);
    let open = loaded("contact submissions", open, &mut failed);

    let metrics = DashboardMetrics {
        products: products.len(),
        orders: orders.len(),
        customers: customers.len(),
        open_messages: open.len(),
    };

    let low_stock = products
        .into_iter()
        .filter(|p| p.low_stock(LOW_STOCK_THRESHOLD))
        .collect();

    render(&DashboardTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/".to_string(),
        metrics,
        recent_orders,
        low_stock,
        error: failed.then_some(LOAD_ERROR),
    })
}
