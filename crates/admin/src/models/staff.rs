//! Staff account rows.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use timberline_core::{Email, StaffRole, StaffUserId};

/// A staff account as listed on the staff screen.
///
/// `role` here is for display. Authorization never reads it; every
/// privileged request asks the backend through `staff_role`.
#[derive(Debug, Clone, Deserialize)]
pub struct StaffUser {
    pub id: StaffUserId,
    pub email: Email,
    pub name: String,
    pub role: StaffRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The columns needed to check a password.
#[derive(Clone, Deserialize)]
pub struct StaffCredentials {
    pub id: StaffUserId,
    pub email: Email,
    pub name: String,
    pub password_hash: String,
    pub active: bool,
}

impl std::fmt::Debug for StaffCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaffCredentials")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
