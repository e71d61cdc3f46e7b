//! Database migrations.
//!
//! Migration files live in `crates/realtime/migrations/` and are embedded at
//! compile time. The last one installs the `timberline_changes` trigger that
//! both services listen on.

use super::CliError;

/// Apply every pending migration.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CliError> {
    let pool = super::connect().await?;

    let migrator = sqlx::migrate!("../realtime/migrations");
    tracing::info!(available = migrator.iter().count(), "applying migrations");
    migrator.run(&pool).await?;

    tracing::info!("database is up to date");
    Ok(())
}
