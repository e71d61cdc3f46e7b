//! Shopper sessions.
//!
//! Rows live in `storefront.session` (see the sessions migration). A session
//! holds the cart and the id of the last order placed, nothing else.

use sqlx::PgPool;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

pub const SESSION_COOKIE_NAME: &str = "timberline_session";

/// Carts survive two weeks of inactivity.
const CART_LIFETIME: Duration = Duration::days(14);

/// Session layer over `storefront.session`.
///
/// `SameSite=Lax` so a shopper following a link into the site keeps their cart.
///
/// # Errors
///
/// Returns the store's message if it rejects the schema or table name.
pub fn create_session_layer(
    pool: &PgPool,
    config: &StorefrontConfig,
) -> Result<SessionManagerLayer<PostgresStore>, String> {
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("storefront")?
        .with_table_name("session")?;

    Ok(SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(CART_LIFETIME))
        .with_secure(config.is_https())
        .with_same_site(SameSite::Lax)
        .with_http_only(true))
}
