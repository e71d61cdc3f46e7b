//! Session-stored staff identity.

use serde::{Deserialize, Serialize};

use timberline_core::{Email, StaffUserId};

use super::staff::StaffCredentials;

/// Who is signed in.
///
/// Holds identity only. The role is resolved per request from the backend,
/// so a demotion or deactivation takes effect on the next click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStaff {
    pub id: StaffUserId,
    pub email: Email,
    pub name: String,
}

impl From<&StaffCredentials> for CurrentStaff {
    fn from(staff: &StaffCredentials) -> Self {
        Self {
            id: staff.id,
            email: staff.email.clone(),
            name: staff.name.clone(),
        }
    }
}

/// Session keys for staff authentication data.
pub mod keys {
    /// Key for the signed-in staff member.
    pub const CURRENT_STAFF: &str = "current_staff";
}
