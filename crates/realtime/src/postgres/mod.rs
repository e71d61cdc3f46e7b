//! The production backend: [`PgTableClient`] for reads, writes and RPCs, and
//! [`PgChangeFeed`] for change notifications.
//!
//! The schema is in `crates/realtime/migrations/` (apply it with
//! `timberline-cli migrate`). Every table has a trigger that calls `pg_notify('timberline_changes', ...)`
//! with a `{"table", "event", "id"}` payload; [`PgChangeFeed`] listens on that
//! channel.

mod client;
mod listener;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use client::PgTableClient;
pub use listener::{CHANGE_CHANNEL, PgChangeFeed};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Connect a pool shared by [`PgTableClient`] and [`PgChangeFeed`].
///
/// # Errors
///
/// Returns `sqlx::Error` if the first connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .min_connections(2)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect(database_url.expose_secret())
        .await?;
    tracing::debug!(max_connections = MAX_CONNECTIONS, "database pool ready");
    Ok(pool)
}
