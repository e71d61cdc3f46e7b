//! Financial summary.

use askama::Template;
use axum::{extract::State, response::Html};
use tracing::instrument;

use timberline_core::Table;
use timberline_core::finance::FinancialSummary;
use timberline_core::order::Order;
use timberline_realtime::{Query, TableClientExt};

use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, StaffView, render};
use crate::state::AppState;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One row of the monthly table.
#[derive(Debug, Clone)]
pub struct MonthRow {
    pub label: String,
    pub revenue: String,
    pub orders: usize,
}

/// Financials template.
#[derive(Template)]
#[template(path = "financials/index.html")]
pub struct FinancialsTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub summary: FinancialSummary,
    pub months: Vec<MonthRow>,
    pub error: Option<&'static str>,
}

fn month_rows(summary: &FinancialSummary) -> Vec<MonthRow> {
    summary
        .by_month
        .iter()
        .rev()
        .map(|m| {
            let name = usize::try_from(m.month)
                .ok()
                .and_then(|i| MONTH_NAMES.get(i.wrapping_sub(1)))
                .copied()
                .unwrap_or("?");
            MonthRow {
                label: format!("{name} {}", m.year),
                revenue: m.revenue.to_string(),
                orders: m.orders,
            }
        })
        .collect()
}

/// Revenue summary over every order, newest month first.
#[instrument(skip(auth, state), fields(staff_id = %auth.staff.id))]
pub async fn index(
    auth: Authorized<require::AccessFinancials>,
    State(state): State<AppState>,
) -> Html<String> {
    let (orders, error) = match state.tables().fetch::<Order>(Table::Orders, &Query::new()).await {
        Ok(orders) => (orders, None),
        Err(e) => {
            tracing::error!("Failed to fetch orders: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    let summary = FinancialSummary::from_orders(&orders);
    render(&FinancialsTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/financials".to_string(),
        months: month_rows(&summary),
        summary,
        error,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use timberline_core::StaffRole;
    use timberline_realtime::memory::MemoryBackend;

    use super::*;
    use crate::state::test_support;

    #[tokio::test]
    async fn test_summary_excludes_cancelled() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::Orders,
                [
                    json!({"email": "a@example.com", "status": "delivered", "subtotal": "1000", "total": "1000", "created_at": "2026-03-04T10:00:00Z"}),
                    json!({"email": "b@example.com", "status": "shipped", "subtotal": "500", "total": "579", "shipping_total": "79", "created_at": "2026-04-01T10:00:00Z"}),
                    json!({"email": "c@example.com", "status": "cancelled", "subtotal": "9000", "total": "9000", "created_at": "2026-04-02T10:00:00Z"}),
                ],
            )
            .unwrap();
        let state = test_support::state(&backend);
        let (_, staff) = test_support::signed_in(&backend, StaffRole::Admin).await;
        let auth = Authorized::<require::AccessFinancials>::verify(&state, staff).await.unwrap();

        let Html(body) = index(auth, State(state)).await;
        assert!(body.contains("$1,579.00"));
        assert!(!body.contains("$10,579.00"));
        assert!(body.contains("Apr 2026"));
        assert!(body.contains("Mar 2026"));
    }
}
