//! Command implementations.

pub mod migrate;
pub mod seed;
pub mod staff;

use sqlx::PgPool;
use thiserror::Error;

use timberline_core::env::{self, ConfigError};
use timberline_realtime::BackendError;
use timberline_realtime::postgres::create_pool;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Table read or write failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Invalid role name.
    #[error("Invalid role: {0}. Valid roles: super_admin, admin, manager, support")]
    InvalidRole(String),

    /// No staff account with this email.
    #[error("No staff account with email: {0}")]
    UnknownStaff(String),

    /// Staff account creation was refused.
    #[error("{0}")]
    Staff(#[from] timberline_admin::services::auth::AuthError),

    /// Input file could not be read.
    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Catalog file is not valid YAML for the expected shape.
    #[error("Invalid catalog file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A record could not be encoded.
    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog entries failed validation.
    #[error("{} invalid catalog entries", .0.len())]
    InvalidCatalog(Vec<String>),
}

/// Connect using `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CliError> {
    let _ = dotenvy::dotenv();
    let database_url = env::database_url("DATABASE_URL")?;

    tracing::info!("connecting to database");
    Ok(create_pool(&database_url).await?)
}
