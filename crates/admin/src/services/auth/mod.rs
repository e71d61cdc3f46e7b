//! Staff authentication service.
//!
//! Email + password sign-in against `staff_users` (argon2id hashes). The
//! session carries identity only; roles are resolved from the backend on
//! every privileged request through the `staff_role` procedure.
//!
//! There is no fallback identity: a missing or unreadable session means
//! "not signed in", full stop.

mod error;

pub use error::AuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use serde::Serialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use uuid::Uuid;

use timberline_core::authz::{Capability, is_allowed};
use timberline_core::{Email, StaffRole, StaffUserId, Table};
use timberline_realtime::{BackendError, Query, TableClient, TableClientExt};

use crate::models::{CurrentStaff, StaffCredentials, StaffUser, session_keys};

/// Minimum password length for staff accounts.
pub const MIN_PASSWORD_LENGTH: usize = 12;

/// Name of the server-side role procedure.
pub const STAFF_ROLE_RPC: &str = "staff_role";

/// Verified against when an email has no account.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("timberline-no-such-account").ok());

/// Staff authentication service.
pub struct StaffAuthService<'a> {
    tables: &'a dyn TableClient,
}

#[derive(Serialize)]
struct NewStaff<'a> {
    email: &'a Email,
    name: &'a str,
    role: StaffRole,
    password_hash: String,
}

impl<'a> StaffAuthService<'a> {
    #[must_use]
    pub const fn new(tables: &'a dyn TableClient) -> Self {
        Self { tables }
    }

    /// Check an email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email, a wrong
    /// password, or a deactivated account, so callers cannot tell which.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CurrentStaff, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;

        let found = self
            .tables
            .fetch::<StaffCredentials>(
                Table::StaffUsers,
                &Query::new().eq("email", email.as_str()).limit(1),
            )
            .await?
            .into_iter()
            .next();

        let Some(staff) = found else {
            // Unknown emails cost the same argon2 work as real ones.
            if let Some(hash) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, hash);
            }
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &staff.password_hash)?;

        if !staff.active {
            tracing::warn!(staff_id = %staff.id, "sign-in attempt for deactivated account");
            return Err(AuthError::InvalidCredentials);
        }

        Ok(CurrentStaff::from(&staff))
    }

    /// The role the backend reports for `staff_id`.
    ///
    /// `None` for unknown or deactivated staff, and for any role string this
    /// build does not recognize.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the procedure call fails.
    pub async fn verified_role(&self, staff_id: StaffUserId) -> Result<Option<StaffRole>, BackendError> {
        let value = self
            .tables
            .rpc(STAFF_ROLE_RPC, json!({ "staff_id": staff_id.as_i32() }))
            .await?;

        match value {
            Value::Null => Ok(None),
            Value::String(role) => Ok(role.parse::<StaffRole>().map_or_else(
                |e| {
                    tracing::warn!(staff_id = %staff_id, error = %e, "unrecognized staff role");
                    None
                },
                Some,
            )),
            other => Err(BackendError::DataCorruption(format!(
                "{STAFF_ROLE_RPC} returned {other}"
            ))),
        }
    }

    /// Whether `staff` currently holds `capability`.
    ///
    /// Backend failures deny.
    pub async fn allows(&self, staff: &CurrentStaff, capability: Capability) -> bool {
        match self.verified_role(staff.id).await {
            Ok(role) => is_allowed(role, capability),
            Err(e) => {
                tracing::error!(staff_id = %staff.id, error = %e, "role lookup failed");
                false
            }
        }
    }

    /// Create a staff account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `AuthError::WeakPassword`, or
    /// `AuthError::AlreadyExists` for bad input, otherwise the backend error.
    pub async fn create_staff(
        &self,
        email: &str,
        name: &str,
        role: StaffRole,
        password: &str,
    ) -> Result<StaffUser, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let record = NewStaff {
            email: &email,
            name: name.trim(),
            role,
            password_hash: hash_password(password)?,
        };
        let staff: StaffUser = self.tables.create(Table::StaffUsers, &record).await?;

        tracing::info!(staff_id = %staff.id, role = %role, "staff account created");
        Ok(staff)
    }

    /// Change a staff member's role.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the account does not exist.
    pub async fn set_role(&self, staff_id: StaffUserId, role: StaffRole) -> Result<StaffUser, BackendError> {
        self.tables
            .modify(Table::StaffUsers, staff_id.into(), &json!({ "role": role }))
            .await
    }

    /// Deactivate an account. Its sessions stop authorizing immediately
    /// because `staff_role` no longer returns a role.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the account does not exist.
    pub async fn deactivate(&self, staff_id: StaffUserId) -> Result<StaffUser, BackendError> {
        self.tables
            .modify(Table::StaffUsers, staff_id.into(), &json!({ "active": false }))
            .await
    }
}

// =============================================================================
// Session helpers
// =============================================================================

/// The signed-in staff member, if any.
///
/// An unreadable session is treated as signed out.
pub async fn current_staff(session: &Session) -> Option<CurrentStaff> {
    match session.get::<CurrentStaff>(session_keys::CURRENT_STAFF).await {
        Ok(staff) => staff,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read staff session");
            None
        }
    }
}

/// Record a successful sign-in, rotating the session id.
///
/// # Errors
///
/// Returns the session store error.
pub async fn start_session(session: &Session, staff: &CurrentStaff) -> Result<(), AuthError> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_STAFF, staff).await?;
    Ok(())
}

/// Sign out, discarding everything in the session.
///
/// # Errors
///
/// Returns the session store error.
pub async fn sign_out(session: &Session) -> Result<(), AuthError> {
    session.flush().await?;
    Ok(())
}

/// `true` iff a valid session exists and the server-verified role grants `capability`.
pub async fn can(tables: &dyn TableClient, session: &Session, capability: Capability) -> bool {
    match current_staff(session).await {
        Some(staff) => StaffAuthService::new(tables).allows(&staff, capability).await,
        None => false,
    }
}

// =============================================================================
// Passwords
// =============================================================================

/// Validate password strength.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes()).map_err(|_| AuthError::PasswordHash)?;
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use timberline_realtime::memory::MemoryBackend;
    use tower_sessions::MemoryStore;

    use super::*;

    const PASSWORD: &str = "walnut-credenza-42";

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn backend_with(role: StaffRole) -> (MemoryBackend, CurrentStaff) {
        let backend = MemoryBackend::new();
        let staff = StaffAuthService::new(&backend)
            .create_staff("Maya@Timberline.example", "Maya", role, PASSWORD)
            .await
            .unwrap();
        let current = CurrentStaff {
            id: staff.id,
            email: staff.email,
            name: staff.name,
        };
        (backend, current)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(PASSWORD).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(PASSWORD, &hash).is_ok());
        assert!(matches!(
            verify_password("wrong-password", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_unknown_emails_still_pay_for_a_hash_check() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(PasswordHash::new(hash).is_ok());
        assert!(matches!(verify_password(PASSWORD, hash), Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn test_validate_password_length() {
        assert!(matches!(validate_password("short"), Err(AuthError::WeakPassword(_))));
        assert!(validate_password(PASSWORD).is_ok());
    }

    #[tokio::test]
    async fn test_sign_in() {
        let (backend, current) = backend_with(StaffRole::Manager).await;
        let auth = StaffAuthService::new(&backend);

        let signed_in = auth.sign_in("  maya@timberline.example ", PASSWORD).await.unwrap();
        assert_eq!(signed_in, current);

        assert!(matches!(
            auth.sign_in("maya@timberline.example", "not-the-password").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("nobody@timberline.example", PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_deactivated_staff_cannot_sign_in_or_act() {
        let (backend, current) = backend_with(StaffRole::Admin).await;
        let auth = StaffAuthService::new(&backend);
        auth.deactivate(current.id).await.unwrap();

        assert!(matches!(
            auth.sign_in("maya@timberline.example", PASSWORD).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(auth.verified_role(current.id).await.unwrap(), None);
        assert!(!auth.allows(&current, Capability::ViewDashboard).await);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (backend, _) = backend_with(StaffRole::Support).await;
        let result = StaffAuthService::new(&backend)
            .create_staff("maya@timberline.example", "Other Maya", StaffRole::Support, PASSWORD)
            .await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_can_uses_server_role_not_session() {
        let (backend, current) = backend_with(StaffRole::Support).await;
        let session = session();

        assert!(!can(&backend, &session, Capability::ViewDashboard).await);

        start_session(&session, &current).await.unwrap();
        assert!(can(&backend, &session, Capability::ManageOrders).await);
        assert!(!can(&backend, &session, Capability::AccessFinancials).await);

        StaffAuthService::new(&backend)
            .set_role(current.id, StaffRole::Admin)
            .await
            .unwrap();
        assert!(can(&backend, &session, Capability::AccessFinancials).await);

        sign_out(&session).await.unwrap();
        assert!(current_staff(&session).await.is_none());
        assert!(!can(&backend, &session, Capability::ManageOrders).await);
    }

    #[tokio::test]
    async fn test_unrecognized_role_denies() {
        let backend = MemoryBackend::new();
        backend.register_rpc(STAFF_ROLE_RPC, |_| Ok(json!("owner")));
        let auth = StaffAuthService::new(&backend);

        assert_eq!(auth.verified_role(StaffUserId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_role_lookup_failure_denies() {
        let backend = MemoryBackend::new();
        backend.register_rpc(STAFF_ROLE_RPC, |_| {
            Err(BackendError::DataCorruption("boom".to_string()))
        });
        let staff = CurrentStaff {
            id: StaffUserId::new(1),
            email: Email::parse("ops@timberline.example").unwrap(),
            name: "Ops".to_string(),
        };

        assert!(!StaffAuthService::new(&backend).allows(&staff, Capability::ViewDashboard).await);
    }
}
