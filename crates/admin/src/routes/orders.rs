//! Order route handlers.

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use timberline_core::order::{Order, OrderItem};
use timberline_core::{OrderId, OrderStatus, Table};
use timberline_realtime::{Query as TableQuery, TableClientExt};

use crate::components::ListTable;
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, StaffView, non_blank, render};
use crate::state::AppState;

/// `?status=&notice=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub notice: Option<String>,
}

impl OrderListQuery {
    /// The selected status, ignoring unknown values.
    fn status(&self) -> Option<OrderStatus> {
        non_blank(self.status.as_deref()).and_then(|s| OrderStatus::from_str(s).ok())
    }
}

/// Order list template.
#[derive(Template)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub table: ListTable,
    pub orders: Vec<Order>,
    pub query: OrderListQuery,
    pub error: Option<&'static str>,
}

impl OrdersIndexTemplate {
    fn filter_value(&self, key: &str) -> &str {
        match key {
            "status" => self.query.status.as_deref().unwrap_or_default(),
            _ => "",
        }
    }
}

/// Order detail template.
#[derive(Template)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub next_statuses: Vec<OrderStatus>,
}

/// Status change form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Order list, newest first.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageOrders>,
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Html<String> {
    let mut select = TableQuery::new();
    if let Some(status) = query.status() {
        select = select.eq("status", status.as_str());
    }
    let select = select.order_by("created_at", false);

    let (orders, error) = match state.tables().fetch::<Order>(Table::Orders, &select).await {
        Ok(orders) => (orders, None),
        Err(e) => {
            tracing::error!("Failed to fetch orders: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    render(&OrdersIndexTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/orders".to_string(),
        table: ListTable::orders(),
        orders,
        query,
        error,
    })
}

/// Order detail with line items.
///
/// # Errors
///
/// Returns `NotFound` for an unknown order.
#[instrument(skip(auth, state))]
pub async fn show(
    auth: Authorized<require::ManageOrders>,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Html<String>> {
    let tables = state.tables();
    let order: Order = tables.fetch_by_id(Table::Orders, id.into()).await?;
    let items = tables
        .fetch::<OrderItem>(
            Table::OrderItems,
            &TableQuery::new().eq("order_id", id.as_i32()).order_by("id", true),
        )
        .await?;

    Ok(render(&OrderShowTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/orders".to_string(),
        next_statuses: order.status.next_statuses(),
        order,
        items,
    }))
}

/// Server-side procedure that moves an order only from the status it was read in.
pub const TRANSITION_ORDER_RPC: &str = "transition_order";

/// Move an order along its lifecycle.
///
/// The write only lands if the order still has the status it was read with,
/// so two staff acting at once cannot revive a cancelled or delivered order.
///
/// # Errors
///
/// Returns `BadRequest` for an unknown status or a move the lifecycle does
/// not allow, `NotFound` for an unknown order, and `Conflict` when the order
/// changed in the meantime.
#[instrument(skip(auth, state, form), fields(staff_id = %auth.staff.id, status = %form.status))]
pub async fn update_status(
    auth: Authorized<require::ManageOrders>,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let next = OrderStatus::from_str(form.status.trim())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let tables = state.tables();
    let mut order: Order = tables.fetch_by_id(Table::Orders, id.into()).await?;
    let from = order.status;
    order
        .transition(next)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let moved = tables
        .rpc(
            TRANSITION_ORDER_RPC,
            json!({ "id": id.as_i32(), "from": from, "to": next }),
        )
        .await?;
    if moved.is_null() {
        tracing::warn!(order_id = %id, %from, to = %next, "order changed before the status update");
        return Err(AppError::Conflict(format!(
            "Order {id} was updated by someone else. Reload it and try again."
        )));
    }

    tracing::info!(order_id = %id, %from, to = %next, "order status changed");
    Ok(Redirect::to(&format!("/orders/{id}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use timberline_core::StaffRole;
    use timberline_realtime::memory::MemoryBackend;

    use super::*;
    use crate::state::test_support;

    fn seed(backend: &MemoryBackend) {
        backend
            .seed(
                Table::Orders,
                [
                    json!({"id": 1, "email": "a@example.com", "status": "pending", "subtotal": "1299", "total": "1299"}),
                    json!({"id": 2, "email": "b@example.com", "status": "delivered", "subtotal": "499", "total": "578", "shipping_total": "79"}),
                ],
            )
            .unwrap();
        backend
            .seed(
                Table::OrderItems,
                [json!({"order_id": 1, "product_name": "Oak Desk", "unit_price": "1299", "quantity": 1})],
            )
            .unwrap();
    }

    async fn support(backend: &MemoryBackend) -> (AppState, Authorized<require::ManageOrders>) {
        let state = test_support::state(backend);
        let (_, staff) = test_support::signed_in(backend, StaffRole::Support).await;
        let auth = Authorized::verify(&state, staff).await.unwrap();
        (state, auth)
    }

    #[tokio::test]
    async fn test_index_filters_by_status() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let (state, auth) = support(&backend).await;

        let query = OrderListQuery {
            status: Some("delivered".to_string()),
            notice: None,
        };
        let Html(body) = index(auth, State(state), Query(query)).await;
        assert!(body.contains("b@example.com"));
        assert!(!body.contains("a@example.com"));
    }

    #[tokio::test]
    async fn test_show_lists_items() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let (state, auth) = support(&backend).await;

        let Html(body) = show(auth, State(state), Path(OrderId::new(1))).await.unwrap();
        assert!(body.contains("Oak Desk"));
        assert!(body.contains("Processing"));
    }

    #[tokio::test]
    async fn test_status_follows_lifecycle() {
        let backend = MemoryBackend::new();
        seed(&backend);

        let (state, auth) = support(&backend).await;
        let form = StatusForm {
            status: "processing".to_string(),
        };
        update_status(auth, State(state), Path(OrderId::new(1)), Form(form))
            .await
            .unwrap();
        assert_eq!(backend.rows(Table::Orders)[0]["status"], json!("processing"));

        let (state, auth) = support(&backend).await;
        let form = StatusForm {
            status: "pending".to_string(),
        };
        let result = update_status(auth, State(state), Path(OrderId::new(2)), Form(form)).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(backend.rows(Table::Orders)[1]["status"], json!("delivered"));
    }

    #[tokio::test]
    async fn test_concurrent_status_changes_cannot_both_land() {
        let backend = MemoryBackend::new();
        seed(&backend);
        let (state, first) = support(&backend).await;
        let (_, second) = support(&backend).await;

        // Both handlers read the order while it is still pending.
        backend.delay_next_selects([Duration::from_millis(50), Duration::from_millis(50)]);
        let ship = StatusForm {
            status: "processing".to_string(),
        };
        let cancel = StatusForm {
            status: "cancelled".to_string(),
        };
        let (shipped, cancelled) = tokio::join!(
            update_status(first, State(state.clone()), Path(OrderId::new(1)), Form(ship)),
            update_status(second, State(state), Path(OrderId::new(1)), Form(cancel)),
        );

        let status = backend.rows(Table::Orders)[0]["status"].clone();
        match (shipped, cancelled) {
            (Ok(_), Err(AppError::Conflict(_))) => assert_eq!(status, json!("processing")),
            (Err(AppError::Conflict(_)), Ok(_)) => assert_eq!(status, json!("cancelled")),
            other => panic!("expected exactly one status change, got {other:?}"),
        }
    }
}
