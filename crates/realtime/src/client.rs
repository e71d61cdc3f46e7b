//! The remote table client.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use timberline_core::Table;

use crate::error::BackendError;
use crate::query::Query;

/// Row-level access to the backend tables.
///
/// Rows travel as JSON objects keyed by column name. Implementations must be
/// cheap to share behind an `Arc`.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Rows of `table` matching `query`.
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert one record and return the stored row (with defaults and id filled in).
    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError>;

    /// Apply `patch` to the row with primary key `id` and return the updated row.
    async fn update(&self, table: Table, id: i64, patch: Value) -> Result<Value, BackendError>;

    /// Delete the row with primary key `id`.
    async fn delete(&self, table: Table, id: i64) -> Result<(), BackendError>;

    /// Call a server-side procedure with a JSON argument object.
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, BackendError>;
}

/// Typed helpers over [`TableClient`].
#[async_trait]
pub trait TableClientExt: TableClient {
    /// Select and decode rows.
    async fn fetch<T>(&self, table: Table, query: &Query) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned + Send,
    {
        self.select(table, query)
            .await?
            .into_iter()
            .map(|row| decode(table, row))
            .collect()
    }

    /// Fetch one row by primary key.
    async fn fetch_by_id<T>(&self, table: Table, id: i64) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Send,
    {
        let query = Query::new().eq("id", id).limit(1);
        let row = self
            .select(table, &query)
            .await?
            .into_iter()
            .next()
            .ok_or(BackendError::NotFound)?;
        decode(table, row)
    }

    /// Insert a serializable record and decode the stored row.
    async fn create<T, R>(&self, table: Table, record: &R) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Send,
        R: Serialize + Sync,
    {
        let record = encode(record)?;
        decode(table, self.insert(table, record).await?)
    }

    /// Update a row from a serializable patch and decode the result.
    async fn modify<T, R>(&self, table: Table, id: i64, patch: &R) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Send,
        R: Serialize + Sync,
    {
        let patch = encode(patch)?;
        decode(table, self.update(table, id, patch).await?)
    }
}

impl<C: TableClient + ?Sized> TableClientExt for C {}

fn decode<T: DeserializeOwned>(table: Table, row: Value) -> Result<T, BackendError> {
    serde_json::from_value(row)
        .map_err(|e| BackendError::DataCorruption(format!("invalid {table} row: {e}")))
}

fn encode<R: Serialize>(record: &R) -> Result<Value, BackendError> {
    match serde_json::to_value(record) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(BackendError::InvalidRecord(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(BackendError::InvalidRecord(e.to_string())),
    }
}
