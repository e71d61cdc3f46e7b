//! Staff account management.
//!
//! There is no default or bootstrap account: the first super admin is made
//! here, and after that accounts can be managed from `/staff`.

use std::io::BufRead;
use std::str::FromStr;

use timberline_admin::models::StaffUser;
use timberline_admin::services::auth::{AuthError, StaffAuthService};
use timberline_core::{Email, StaffRole, Table};
use timberline_realtime::postgres::PgTableClient;
use timberline_realtime::{Query, TableClient, TableClientExt};

use super::CliError;

/// # Errors
///
/// `InvalidRole` for anything but the four role names.
pub fn parse_role(raw: &str) -> Result<StaffRole, CliError> {
    StaffRole::from_str(raw.trim()).map_err(|_| CliError::InvalidRole(raw.to_owned()))
}

/// Read a password from the first line of stdin.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub fn read_password() -> Result<String, CliError> {
    tracing::info!("Reading password from stdin...");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|source| CliError::Io {
            path: "<stdin>".into(),
            source,
        })?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Create a staff account.
///
/// # Errors
///
/// Returns an error for an invalid email or password, a duplicate email, or a
/// database failure.
pub async fn create(email: &str, name: &str, role: StaffRole, password: &str) -> Result<(), CliError> {
    let pool = super::connect().await?;
    let staff = create_with(&PgTableClient::new(pool), email, name, role, password).await?;

    tracing::info!(id = %staff.id, email = %staff.email, role = %staff.role, "staff account created");
    Ok(())
}

async fn create_with(
    tables: &dyn TableClient,
    email: &str,
    name: &str,
    role: StaffRole,
    password: &str,
) -> Result<StaffUser, CliError> {
    Ok(StaffAuthService::new(tables)
        .create_staff(email, name, role, password)
        .await?)
}

/// Change the role of the account with `email`.
///
/// # Errors
///
/// Returns an error for an unknown account or a database failure.
pub async fn set_role(email: &str, role: StaffRole) -> Result<(), CliError> {
    let pool = super::connect().await?;
    let staff = set_role_with(&PgTableClient::new(pool), email, role).await?;

    tracing::info!(email = %staff.email, role = %staff.role, "role updated");
    Ok(())
}

/// Deactivate the account with `email`.
///
/// # Errors
///
/// Returns an error for an unknown account or a database failure.
pub async fn deactivate(email: &str) -> Result<(), CliError> {
    let pool = super::connect().await?;
    let staff = deactivate_with(&PgTableClient::new(pool), email).await?;

    tracing::info!(email = %staff.email, "staff account deactivated");
    Ok(())
}

async fn find_by_email(tables: &dyn TableClient, email: &str) -> Result<StaffUser, CliError> {
    let email = Email::parse(email).map_err(AuthError::from)?;
    let query = Query::new().eq("email", email.as_str()).limit(1);
    let existing: Vec<StaffUser> = tables.fetch(Table::StaffUsers, &query).await?;
    existing
        .into_iter()
        .next()
        .ok_or_else(|| CliError::UnknownStaff(email.to_string()))
}

async fn set_role_with(tables: &dyn TableClient, email: &str, role: StaffRole) -> Result<StaffUser, CliError> {
    let staff = find_by_email(tables, email).await?;
    Ok(StaffAuthService::new(tables).set_role(staff.id, role).await?)
}

async fn deactivate_with(tables: &dyn TableClient, email: &str) -> Result<StaffUser, CliError> {
    let staff = find_by_email(tables, email).await?;
    Ok(StaffAuthService::new(tables).deactivate(staff.id).await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use timberline_realtime::memory::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn test_create_then_change_role() {
        let backend = MemoryBackend::new();

        let staff = create_with(
            &backend,
            "Owner@Timberline.example",
            "Owner",
            StaffRole::SuperAdmin,
            "correct horse battery",
        )
        .await
        .unwrap();
        assert_eq!(staff.role, StaffRole::SuperAdmin);

        let updated = set_role_with(&backend, "owner@timberline.example", StaffRole::Manager)
            .await
            .unwrap();
        assert_eq!(updated.id, staff.id);
        assert_eq!(updated.role, StaffRole::Manager);

        let off = deactivate_with(&backend, "owner@timberline.example").await.unwrap();
        assert!(!off.active);
        assert_eq!(backend.rows(Table::StaffUsers)[0]["active"], false);
    }

    #[tokio::test]
    async fn test_refuses_weak_passwords_and_unknown_accounts() {
        let backend = MemoryBackend::new();

        let weak = create_with(&backend, "a@timberline.example", "A", StaffRole::Admin, "short").await;
        assert!(matches!(weak, Err(CliError::Staff(AuthError::WeakPassword(_)))));
        assert!(backend.rows(Table::StaffUsers).is_empty());

        let missing = set_role_with(&backend, "nobody@timberline.example", StaffRole::Admin).await;
        assert!(matches!(missing, Err(CliError::UnknownStaff(_))));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role(" manager ").unwrap(), StaffRole::Manager);
        assert!(matches!(parse_role("owner"), Err(CliError::InvalidRole(_))));
    }
}
