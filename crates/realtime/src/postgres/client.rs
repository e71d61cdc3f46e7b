//! [`TableClient`] over sqlx.
//!
//! Rows are returned as `to_jsonb(row)`. Incoming records are coerced to the
//! table's column types with `jsonb_populate_record`, so callers never build
//! typed SQL. Table names come from the closed [`Table`] set; column and
//! function names are checked with [`validate_identifier`] before they are
//! interpolated.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use timberline_core::Table;

use crate::client::TableClient;
use crate::error::{BackendError, validate_identifier};
use crate::query::{Filter, Query};

/// Table client backed by a connection pool.
#[derive(Debug, Clone)]
pub struct PgTableClient {
    pool: PgPool,
}

impl PgTableClient {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn object(value: Value) -> Result<Map<String, Value>, BackendError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::InvalidRecord(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Validated, comma-separated column list.
fn column_list(fields: &Map<String, Value>) -> Result<String, BackendError> {
    let columns = fields
        .keys()
        .map(|k| validate_identifier(k))
        .collect::<Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(BackendError::InvalidRecord("no columns given".to_string()));
    }
    Ok(columns.join(", "))
}

/// Append `WHERE`/`ORDER BY`/`LIMIT` for `query` against alias `t`.
fn push_query(
    builder: &mut QueryBuilder<'_, Postgres>,
    table: Table,
    query: &Query,
) -> Result<(), BackendError> {
    for (i, filter) in query.filters.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        let column = validate_identifier(filter.column())?;
        let (op, value) = match filter {
            Filter::Eq(_, Value::Null) => {
                builder.push(format_args!("t.{column} IS NULL"));
                continue;
            }
            Filter::Eq(_, v) => ("=", v),
            Filter::Gte(_, v) => (">=", v),
            Filter::Lte(_, v) => ("<=", v),
        };
        builder.push(format_args!(
            "t.{column} {op} (SELECT r.{column} FROM jsonb_populate_record(null::{table}, jsonb_build_object('{column}', "
        ));
        builder.push_bind(Json(value.clone()));
        builder.push("::jsonb)) r)");
    }

    for (i, order) in query.order.iter().enumerate() {
        builder.push(if i == 0 { " ORDER BY " } else { ", " });
        let column = validate_identifier(&order.column)?;
        let direction = if order.ascending { "ASC" } else { "DESC" };
        builder.push(format_args!("t.{column} {direction}"));
    }

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(i64::from(limit));
    }
    Ok(())
}

#[async_trait]
impl TableClient for PgTableClient {
    #[tracing::instrument(skip(self, query), fields(table = %table))]
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT to_jsonb(t) FROM {table} t"));
        push_query(&mut builder, table, query)?;

        builder
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await
            .map_err(BackendError::from_sqlx)
    }

    #[tracing::instrument(skip(self, record), fields(table = %table))]
    async fn insert(&self, table: Table, record: Value) -> Result<Value, BackendError> {
        let fields = object(record)?;
        let columns = column_list(&fields)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {table} AS t ({columns}) SELECT {columns} FROM jsonb_populate_record(null::{table}, "
        ));
        builder.push_bind(Json(Value::Object(fields)));
        builder.push("::jsonb) RETURNING to_jsonb(t)");

        builder
            .build_query_scalar::<Value>()
            .fetch_one(&self.pool)
            .await
            .map_err(BackendError::from_sqlx)
    }

    #[tracing::instrument(skip(self, patch), fields(table = %table))]
    async fn update(&self, table: Table, id: i64, patch: Value) -> Result<Value, BackendError> {
        let fields = object(patch)?;
        let columns = column_list(&fields)?;

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "UPDATE {table} AS t SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(null::{table}, "
        ));
        builder.push_bind(Json(Value::Object(fields)));
        builder.push("::jsonb)) WHERE t.id = ");
        builder.push_bind(id);
        builder.push(" RETURNING to_jsonb(t)");

        builder
            .build_query_scalar::<Value>()
            .fetch_optional(&self.pool)
            .await
            .map_err(BackendError::from_sqlx)?
            .ok_or(BackendError::NotFound)
    }

    #[tracing::instrument(skip(self), fields(table = %table))]
    async fn delete(&self, table: Table, id: i64) -> Result<(), BackendError> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(BackendError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, args))]
    async fn rpc(&self, name: &str, args: Value) -> Result<Value, BackendError> {
        let name = validate_identifier(name)?;
        let value: Option<Value> = sqlx::query_scalar(&format!("SELECT to_jsonb({name}($1::jsonb))"))
            .bind(Json(args))
            .fetch_one(&self.pool)
            .await
            .map_err(BackendError::from_sqlx)?;
        Ok(value.unwrap_or(Value::Null))
    }
}
