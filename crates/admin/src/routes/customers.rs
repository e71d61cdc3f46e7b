//! Customer list.

use askama::Template;
use axum::{
    extract::{Query, State},
    response::Html,
};
use serde::Deserialize;
use tracing::instrument;

use timberline_core::Table;
use timberline_core::content::Customer;
use timberline_realtime::{Query as TableQuery, TableClientExt};

use crate::components::ListTable;
use crate::filters;
use crate::middleware::{Authorized, require};
use crate::routes::{LOAD_ERROR, StaffView, non_blank, render};
use crate::state::AppState;

/// `?q=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerListQuery {
    pub q: Option<String>,
}

/// Customer list template.
#[derive(Template)]
#[template(path = "customers/index.html")]
pub struct CustomersIndexTemplate {
    pub staff: StaffView,
    pub current_path: String,
    pub table: ListTable,
    pub customers: Vec<Customer>,
    pub query: CustomerListQuery,
    pub error: Option<&'static str>,
}

impl CustomersIndexTemplate {
    fn filter_value(&self, key: &str) -> &str {
        if key == "q" {
            self.query.q.as_deref().unwrap_or_default()
        } else {
            ""
        }
    }
}

/// Search over the display name and display email.
fn search(customers: Vec<Customer>, q: Option<&str>) -> Vec<Customer> {
    let Some(q) = non_blank(q).map(str::to_lowercase) else {
        return customers;
    };
    customers
        .into_iter()
        .filter(|c| {
            c.display_name().to_lowercase().contains(&q) || c.display_email().contains(&q)
        })
        .collect()
}

/// Customer list page, newest first.
#[instrument(skip(auth, state))]
pub async fn index(
    auth: Authorized<require::ManageOrders>,
    State(state): State<AppState>,
    Query(query): Query<CustomerListQuery>,
) -> Html<String> {
    let select = TableQuery::new().order_by("created_at", false);
    let (customers, error) = match state.tables().fetch::<Customer>(Table::Profiles, &select).await {
        Ok(customers) => (search(customers, query.q.as_deref()), None),
        Err(e) => {
            tracing::error!("Failed to fetch customers: {e}");
            (vec![], Some(LOAD_ERROR))
        }
    };

    render(&CustomersIndexTemplate {
        staff: StaffView::new(&auth.staff, auth.role),
        current_path: "/customers".to_string(),
        table: ListTable::customers(),
        customers,
        query,
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
    async fn test_missing_email_shows_placeholder() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::Profiles,
                [
                    json!({"id": 4, "full_name": "Legacy Buyer"}),
                    json!({"id": 5, "email": "june@example.com", "full_name": "June"}),
                ],
            )
            .unwrap();
        let state = test_support::state(&backend);
        let (_, staff) = test_support::signed_in(&backend, StaffRole::Support).await;
        let auth = Authorized::<require::ManageOrders>::verify(&state, staff).await.unwrap();

        let Html(body) = index(auth, State(state), Query(CustomerListQuery::default())).await;
        assert!(body.contains("customer-4@no-email.invalid"));
        assert!(body.contains("june@example.com"));
    }

    #[test]
    fn test_search_matches_name_or_email() {
        let customer = |id: i32, email: Option<&str>, name: &str| Customer {
            id: id.into(),
            email: email.map(|e| timberline_core::Email::parse(e).unwrap()),
            full_name: Some(name.to_string()),
            phone: None,
            created_at: chrono::Utc::now(),
        };
        let all = vec![
            customer(1, Some("june@example.com"), "June Park"),
            customer(2, None, "Ravi Shah"),
        ];

        assert_eq!(search(all.clone(), Some("park")).len(), 1);
        assert_eq!(search(all.clone(), Some("customer-2")).len(), 1);
        assert_eq!(search(all, Some("  ")).len(), 2);
    }
}
