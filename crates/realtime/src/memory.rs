//! In-process backend for tests and local demos.
//!
//! [`MemoryBackend`] implements both [`TableClient`] and [`ChangeFeed`]. Writes
//! fill the same column defaults and unique constraints as the migrations and
//! publish a change notification, so a mirror wired to it behaves like one
//! wired to `PostgreSQL`. Knobs for slow or failing calls let tests drive the
//! race and failure paths deterministically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};

use timberline_core::Table;

use crate::client::TableClient;
use crate::error::BackendError;
use crate::feed::{ChangeEvent, ChangeFeed, ChangeHub, ChangeNotification, EventFilter, Subscription};
use crate::query::Query;

/// A server-side procedure.
pub type RpcHandler = Arc<dyn Fn(&Value) -> Result<Value, BackendError> + Send + Sync>;

#[derive(Default)]
struct Inner {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    next_ids: Mutex<HashMap<Table, i64>>,
    hub: ChangeHub,
    rpcs: Mutex<HashMap<String, RpcHandler>>,
    select_calls: AtomicUsize,
    select_delays: Mutex<VecDeque<Duration>>,
    fail_selects: AtomicBool,
    subscribe_budget: Mutex<Option<usize>>,
    silent_writes: AtomicBool,
    failing_inserts: Mutex<HashSet<Table>>,
}

/// Shared in-memory tables plus a change hub.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("hub", &self.inner.hub)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn row_id(row: &Value) -> Option<i64> {
    row.get("id").and_then(Value::as_i64)
}

/// Columns with a unique constraint.
const fn unique_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Products | Table::BlogPosts => &["slug"],
        Table::Profiles | Table::NewsletterSubscribers | Table::StaffUsers => &["email"],
        Table::DiscountCodes => &["code"],
        _ => &[],
    }
}

/// Column defaults, matching the migrations.
fn defaults(table: Table) -> Value {
    let now = Utc::now().to_rfc3339();
    match table {
        Table::Products => json!({
            "description": "", "compare_at_price": null, "rating": "0", "review_count": 0,
            "stock": 0, "image_url": null, "bestseller": false, "featured": false,
            "created_at": now, "updated_at": now,
        }),
        Table::Orders => json!({
            "customer_id": null, "status": "pending", "discount_total": "0",
            "shipping_total": "0", "discount_code": null, "shipping_address": "",
            "created_at": now, "updated_at": now,
        }),
        Table::OrderItems => json!({ "product_id": null }),
        Table::Profiles => json!({ "email": null, "full_name": null, "phone": null, "created_at": now }),
        Table::DiscountCodes => json!({
            "min_subtotal": null, "usage_limit": null, "usage_count": 0, "active": true,
            "starts_at": null, "expires_at": null,
        }),
        Table::BlogPosts => json!({ "excerpt": "", "published": false, "published_at": null }),
        Table::ContactSubmissions => json!({ "subject": null, "handled": false, "created_at": now }),
        Table::NewsletterSubscribers => json!({ "subscribed_at": now }),
        Table::Faqs => json!({ "position": 0 }),
        Table::StoreLocations => json!({ "phone": null, "hours": null }),
        Table::StaffUsers => json!({ "role": "support", "active": true, "created_at": now }),
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows without publishing notifications. Missing ids and defaults are filled in.
    ///
    /// # Errors
    ///
    /// Returns the first insert error.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = Value>) -> Result<(), BackendError> {
        for row in rows {
            self.store(table, row)?;
        }
        Ok(())
    }

    /// Copy of every row in `table`, in insertion order.
    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<Value> {
        lock(&self.inner.tables).get(&table).cloned().unwrap_or_default()
    }

    /// The hub behind [`ChangeFeed::subscribe`].
    #[must_use]
    pub fn hub(&self) -> &ChangeHub {
        &self.inner.hub
    }

    /// Channels with an open subscription.
    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        self.inner.hub.active_channels()
    }

    /// Publish a notification by hand, as a trigger would.
    pub fn publish(&self, table: Table, event: ChangeEvent, id: Option<i64>) -> usize {
        self.inner.hub.publish(ChangeNotification { table, event, id })
    }

    /// Number of `select` calls so far.
    #[must_use]
    pub fn select_calls(&self) -> usize {
        self.inner.select_calls.load(Ordering::SeqCst)
    }

    /// Delay the next selects, one duration per call in issue order.
    ///
    /// Rows are read when the call is issued, so a delayed select returns the
    /// data as it was before the delay.
    pub fn delay_next_selects(&self, delays: impl IntoIterator<Item = Duration>) {
        lock(&self.inner.select_delays).extend(delays);
    }

    /// Make every select fail until turned off.
    pub fn fail_selects(&self, fail: bool) {
        self.inner.fail_selects.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more subscriptions, then fail. `None` removes the limit.
    pub fn limit_subscriptions(&self, n: Option<usize>) {
        *lock(&self.inner.subscribe_budget) = n;
    }

    /// Stop (or resume) publishing notifications for writes.
    pub fn silence_writes(&self, silent: bool) {
        self.inner.silent_writes.store(silent, Ordering::SeqCst);
    }

    /// Make inserts into `table` fail (or succeed again).
    pub fn fail_inserts(&self, table: Table, fail: bool) {
        let mut failing = lock(&self.inner.failing_inserts);
        if fail {
            failing.insert(table);
        } else {
            failing.remove(&table);
        }
    }

    /// Register a procedure for [`TableClient::rpc`].
    pub fn register_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        lock(&self.inner.rpcs).insert(name.to_string(), Arc::new(handler));
    }

    fn notify(&self, table: Table, event: ChangeEvent, id: Option<i64>) {
        if !self.inner.silent_writes.load(Ordering::SeqCst) {
            self.publish(table, event, id);
        }
    }

    fn check_unique(rows: &[Value], table: Table, candidate: &Value, skip_id: Option<i64>) -> Result<(), BackendError> {
        for column in unique_columns(table) {
            let Some(value) = candidate.get(*column).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = rows
                .iter()
                .filter(|row| skip_id.is_none() || row_id(row) != skip_id)
                .any(|row| row.get(*column) == Some(value));
            if clash {
                return Err(BackendError::Conflict(format!(
                    "duplicate key value violates unique constraint \"{table}_{column}_key\""
                )));
            }
        }
        Ok(())
    }

    fn store(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        let Value::Object(fields) = record else {
            return Err(BackendError::InvalidRecord("expected an object".to_string()));
        };

        let mut row: Map<String, Value> = match defaults(table) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        row.extend(fields);

        let mut tables = lock(&self.inner.tables);
        let rows = tables.entry(table).or_default();
        let mut next_ids = lock(&self.inner.next_ids);
        let next = next_ids.entry(table).or_insert(0);

        let id = match row.get("id").and_then(Value::as_i64) {
            Some(id) => {
                if rows.iter().any(|r| row_id(r) == Some(id)) {
                    return Err(BackendError::Conflict(format!("duplicate key value violates unique constraint \"{table}_pkey\"")));
                }
                id
            }
            None => *next + 1,
        };
        *next = (*next).max(id);
        row.insert("id".to_string(), json!(id));

        let row = Value::Object(row);
        Self::check_unique(rows, table, &row, None)?;
        rows.push(row.clone());
        Ok(row)
    }

    fn staff_role(&self, args: &Value) -> Value {
        let Some(staff_id) = args.get("staff_id").and_then(Value::as_i64) else {
            return Value::Null;
        };
        lock(&self.inner.tables)
            .get(&Table::StaffUsers)
            .and_then(|rows| {
                rows.iter().find(|row| {
                    row_id(row) == Some(staff_id) && row.get("active") == Some(&Value::Bool(true))
                })
            })
            .and_then(|row| row.get("role").cloned())
            .unwrap_or(Value::Null)
    }

    fn redeem_discount_code(&self, args: &Value) -> Value {
        let Some(code) = args.get("code").and_then(Value::as_str) else {
            return Value::Bool(false);
        };
        let redeemed = {
            let mut tables = lock(&self.inner.tables);
            tables
                .get_mut(&Table::DiscountCodes)
                .and_then(|rows| rows.iter_mut().find(|row| row.get("code").and_then(Value::as_str) == Some(code)))
                .and_then(|row| {
                    let count = row.get("usage_count").and_then(Value::as_i64).unwrap_or(0);
                    let limit = row.get("usage_limit").and_then(Value::as_i64);
                    let active = row.get("active") == Some(&Value::Bool(true));
                    if !active || limit.is_some_and(|limit| count >= limit) {
                        return None;
                    }
                    let id = row_id(row);
                    if let Some(fields) = row.as_object_mut() {
                        fields.insert("usage_count".to_string(), json!(count + 1));
                    }
                    id
                })
        };

        match redeemed {
            Some(id) => {
                self.notify(Table::DiscountCodes, ChangeEvent::Update, Some(id));
                Value::Bool(true)
            }
            None => Value::Bool(false),
        }
    }

    fn release_discount_code(&self, args: &Value) -> Value {
        let Some(code) = args.get("code").and_then(Value::as_str) else {
            return Value::Bool(false);
        };
        let released = {
            let mut tables = lock(&self.inner.tables);
            tables
                .get_mut(&Table::DiscountCodes)
                .and_then(|rows| rows.iter_mut().find(|row| row.get("code").and_then(Value::as_str) == Some(code)))
                .and_then(|row| {
                    let count = row.get("usage_count").and_then(Value::as_i64).unwrap_or(0);
                    if count <= 0 {
                        return None;
                    }
                    let id = row_id(row);
                    if let Some(fields) = row.as_object_mut() {
                        fields.insert("usage_count".to_string(), json!(count - 1));
                    }
                    id
                })
        };

        match released {
            Some(id) => {
                self.notify(Table::DiscountCodes, ChangeEvent::Update, Some(id));
                Value::Bool(true)
            }
            None => Value::Bool(false),
        }
    }

    fn transition_order(&self, args: &Value) -> Value {
        let (Some(id), Some(from), Some(to)) = (
            args.get("id").and_then(Value::as_i64),
            args.get("from").and_then(Value::as_str),
            args.get("to").and_then(Value::as_str),
        ) else {
            return Value::Null;
        };
        let moved = {
            let mut tables = lock(&self.inner.tables);
            tables
                .get_mut(&Table::Orders)
                .and_then(|rows| {
                    rows.iter_mut().find(|row| {
                        row_id(row) == Some(id) && row.get("status").and_then(Value::as_str) == Some(from)
                    })
                })
                .map(|row| {
                    if let Some(fields) = row.as_object_mut() {
                        fields.insert("status".to_string(), json!(to));
                        fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
                    }
                    row.clone()
                })
        };

        match moved {
            Some(row) => {
                self.notify(Table::Orders, ChangeEvent::Update, Some(id));
                row
            }
            None => Value::Null,
        }
    }
}

#[async_trait]
impl TableClient for MemoryBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.inner.select_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_selects.load(Ordering::SeqCst) {
            return Err(BackendError::Database(sqlx::Error::Protocol(format!(
                "select on {table} failed"
            ))));
        }

        let rows = query.apply(&self.rows(table));
        let delay = lock(&self.inner.select_delays).pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        if lock(&self.inner.failing_inserts).contains(&table) {
            return Err(BackendError::Database(sqlx::Error::Protocol(format!(
                "insert into {table} failed"
            ))));
        }
        let row = self.store(table, record)?;
        self.notify(table, ChangeEvent::Insert, row_id(&row));
        Ok(row)
    }

    async fn update(&self, table: Table, id: i64, patch: Value) -> Result<Value, BackendError> {
        let Value::Object(fields) = patch else {
            return Err(BackendError::InvalidRecord("expected an object".to_string()));
        };

        let updated = {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.get_mut(&table).ok_or(BackendError::NotFound)?;
            let index = rows
                .iter()
                .position(|row| row_id(row) == Some(id))
                .ok_or(BackendError::NotFound)?;

            let mut candidate = rows.get(index).cloned().unwrap_or(Value::Null);
            if let Value::Object(map) = &mut candidate {
                map.extend(fields);
                map.insert("id".to_string(), json!(id));
            }
            Self::check_unique(rows, table, &candidate, Some(id))?;
            if let Some(slot) = rows.get_mut(index) {
                *slot = candidate.clone();
            }
            candidate
        };

        self.notify(table, ChangeEvent::Update, Some(id));
        Ok(updated)
    }

    async fn delete(&self, table: Table, id: i64) -> Result<(), BackendError> {
        {
            let mut tables = lock(&self.inner.tables);
            let rows = tables.get_mut(&table).ok_or(BackendError::NotFound)?;
            let before = rows.len();
            rows.retain(|row| row_id(row) != Some(id));
            if rows.len() == before {
                return Err(BackendError::NotFound);
            }
            // order_items.order_id is ON DELETE CASCADE
            if table == Table::Orders
                && let Some(items) = tables.get_mut(&Table::OrderItems)
            {
                items.retain(|item| item.get("order_id").and_then(Value::as_i64) != Some(id));
            }
        }
        self.notify(table, ChangeEvent::Delete, Some(id));
        Ok(())
    }

    async fn rpc(&self, name: &str, args: Value) -> Result<Value, BackendError> {
        let custom = lock(&self.inner.rpcs).get(name).cloned();
        match (custom, name) {
            (Some(handler), _) => handler(&args),
            (None, "staff_role") => Ok(self.staff_role(&args)),
            (None, "redeem_discount_code") => Ok(self.redeem_discount_code(&args)),
            (None, "release_discount_code") => Ok(self.release_discount_code(&args)),
            (None, "transition_order") => Ok(self.transition_order(&args)),
            (None, other) => Err(BackendError::InvalidIdentifier(other.to_string())),
        }
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(
        &self,
        channel: &str,
        table: Table,
        filter: EventFilter,
    ) -> Result<Subscription, BackendError> {
        {
            let mut budget = lock(&self.inner.subscribe_budget);
            match budget.as_mut() {
                Some(0) => {
                    return Err(BackendError::Subscribe(format!(
                        "channel {channel} refused"
                    )));
                }
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }
        Ok(self.inner.hub.open(channel, table, filter))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::TableClientExt;

    #[tokio::test]
    async fn test_insert_fills_defaults_and_ids() {
        let backend = MemoryBackend::new();
        let row = backend
            .insert(Table::Faqs, json!({"question": "Do you ship?", "answer": "Yes"}))
            .await
            .unwrap();
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["position"], json!(0));

        let row = backend
            .insert(Table::Faqs, json!({"question": "Returns?", "answer": "30 days"}))
            .await
            .unwrap();
        assert_eq!(row["id"], json!(2));
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let backend = MemoryBackend::new();
        backend
            .insert(Table::NewsletterSubscribers, json!({"email": "a@b.co"}))
            .await
            .unwrap();
        let err = backend
            .insert(Table::NewsletterSubscribers, json!({"email": "a@b.co"}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_writes_publish_notifications() {
        let backend = MemoryBackend::new();
        let mut sub = backend
            .subscribe("db-changes:faqs", Table::Faqs, EventFilter::All)
            .await
            .unwrap();

        let row = backend
            .insert(Table::Faqs, json!({"question": "q", "answer": "a"}))
            .await
            .unwrap();
        backend
            .update(Table::Faqs, 1, json!({"answer": "b"}))
            .await
            .unwrap();
        backend.delete(Table::Faqs, 1).await.unwrap();

        let mut events = Vec::new();
        for _ in 0..3 {
            let n = tokio::time::timeout(Duration::from_secs(1), sub.next())
                .await
                .unwrap()
                .unwrap();
            events.push(n.event);
        }
        assert_eq!(row["id"], json!(1));
        assert_eq!(
            events,
            vec![ChangeEvent::Insert, ChangeEvent::Update, ChangeEvent::Delete]
        );
    }

    #[tokio::test]
    async fn test_silenced_writes_do_not_notify() {
        let backend = MemoryBackend::new();
        let mut sub = backend
            .subscribe("quiet:faqs", Table::Faqs, EventFilter::All)
            .await
            .unwrap();

        backend.silence_writes(true);
        backend
            .insert(Table::Faqs, json!({"question": "q", "answer": "a"}))
            .await
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), sub.next()).await.is_err());

        backend.silence_writes(false);
        backend.delete(Table::Faqs, 1).await.unwrap();
        let n = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.event, ChangeEvent::Delete);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_rows() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.update(Table::Orders, 9, json!({})).await,
            Err(BackendError::NotFound)
        ));
        assert!(matches!(
            backend.delete(Table::Orders, 9).await,
            Err(BackendError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_builtin_staff_role() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::StaffUsers,
                [
                    json!({"id": 1, "email": "a@t.co", "name": "A", "role": "admin", "password_hash": "x"}),
                    json!({"id": 2, "email": "b@t.co", "name": "B", "role": "admin", "password_hash": "x", "active": false}),
                ],
            )
            .unwrap();

        assert_eq!(
            backend.rpc("staff_role", json!({"staff_id": 1})).await.unwrap(),
            json!("admin")
        );
        assert_eq!(
            backend.rpc("staff_role", json!({"staff_id": 2})).await.unwrap(),
            Value::Null
        );
        assert_eq!(
            backend.rpc("staff_role", json!({})).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_redeem_respects_usage_limit() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::DiscountCodes,
                [json!({"code": "ONCE", "kind": "fixed_amount", "value": "10", "usage_limit": 1})],
            )
            .unwrap();

        let args = json!({"code": "ONCE"});
        assert_eq!(backend.rpc("redeem_discount_code", args.clone()).await.unwrap(), json!(true));
        assert_eq!(backend.rpc("redeem_discount_code", args).await.unwrap(), json!(false));
        assert_eq!(backend.rows(Table::DiscountCodes)[0]["usage_count"], json!(1));
    }

    #[tokio::test]
    async fn test_release_gives_a_use_back() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::DiscountCodes,
                [json!({"code": "ONCE", "kind": "fixed_amount", "value": "10", "usage_limit": 1})],
            )
            .unwrap();

        let args = json!({"code": "ONCE"});
        assert_eq!(backend.rpc("release_discount_code", args.clone()).await.unwrap(), json!(false));
        assert_eq!(backend.rpc("redeem_discount_code", args.clone()).await.unwrap(), json!(true));
        assert_eq!(backend.rpc("release_discount_code", args.clone()).await.unwrap(), json!(true));
        assert_eq!(backend.rpc("redeem_discount_code", args).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn test_transition_order_requires_expected_status() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::Orders,
                [json!({"id": 7, "email": "a@t.co", "status": "pending", "subtotal": "10", "total": "10"})],
            )
            .unwrap();

        let moved = backend
            .rpc("transition_order", json!({"id": 7, "from": "pending", "to": "cancelled"}))
            .await
            .unwrap();
        assert_eq!(moved["status"], json!("cancelled"));

        let stale = backend
            .rpc("transition_order", json!({"id": 7, "from": "pending", "to": "processing"}))
            .await
            .unwrap();
        assert_eq!(stale, Value::Null);
        assert_eq!(backend.rows(Table::Orders)[0]["status"], json!("cancelled"));
    }

    #[tokio::test]
    async fn test_failing_inserts_and_order_cascade() {
        let backend = MemoryBackend::new();
        let order = backend
            .insert(Table::Orders, json!({"email": "a@t.co", "subtotal": "10", "total": "10"}))
            .await
            .unwrap();
        let order_id = order["id"].as_i64().unwrap();
        backend
            .insert(Table::OrderItems, json!({"order_id": order_id, "product_name": "Stool", "unit_price": "10", "quantity": 1}))
            .await
            .unwrap();

        backend.fail_inserts(Table::OrderItems, true);
        assert!(matches!(
            backend.insert(Table::OrderItems, json!({"order_id": order_id})).await,
            Err(BackendError::Database(_))
        ));
        backend.fail_inserts(Table::OrderItems, false);

        backend.delete(Table::Orders, order_id).await.unwrap();
        assert!(backend.rows(Table::OrderItems).is_empty());
    }

    #[tokio::test]
    async fn test_subscription_budget() {
        let backend = MemoryBackend::new();
        backend.limit_subscriptions(Some(1));
        let first = backend.subscribe("a:faqs", Table::Faqs, EventFilter::All).await;
        assert!(first.is_ok());
        assert!(
            backend
                .subscribe("a:orders", Table::Orders, EventFilter::All)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_typed_fetch() {
        #[derive(serde::Deserialize)]
        struct Faq {
            question: String,
            position: i32,
        }

        let backend = MemoryBackend::new();
        backend
            .seed(Table::Faqs, [json!({"question": "Warranty?", "answer": "10 years", "position": 3})])
            .unwrap();
        let faqs: Vec<Faq> = backend.fetch(Table::Faqs, &Query::new()).await.unwrap();
        assert_eq!(faqs[0].question, "Warranty?");
        assert_eq!(faqs[0].position, 3);
    }
}
