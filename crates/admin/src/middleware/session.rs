//! Staff sessions.
//!
//! Rows live in `admin.session`. The cookie is `SameSite=Strict` and lapses
//! after a day without requests. Only the staff identity is stored; the role
//! is looked up again on every privileged request.

use sqlx::PgPool;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::AdminConfig;

/// Cookie carrying the staff session id.
pub const SESSION_COOKIE_NAME: &str = "timberline_admin_session";

const IDLE_TIMEOUT: Duration = Duration::hours(24);

/// Session layer over `admin.session`.
///
/// # Errors
///
/// Returns the store's message if it rejects the schema or table name.
pub fn create_session_layer(
    pool: &PgPool,
    config: &AdminConfig,
) -> Result<SessionManagerLayer<PostgresStore>, String> {
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("admin")?
        .with_table_name("session")?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(IDLE_TIMEOUT))
        .with_secure(config.is_https())
        .with_same_site(SameSite::Strict)
        .with_http_only(true))
}
