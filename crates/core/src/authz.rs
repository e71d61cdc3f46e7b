//! Staff capabilities and the single role policy.
//!
//! The role passed in here must come from the backend (the `staff_role`
//! procedure), never from anything the browser sent.

use serde::{Deserialize, Serialize};

use crate::types::StaffRole;

/// Something a staff member may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewDashboard,
    ManageProducts,
    ManageOrders,
    ManageUsers,
    AccessFinancials,
    ManageContent,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Self; 6] = [
        Self::ViewDashboard,
        Self::ManageProducts,
        Self::ManageOrders,
        Self::ManageUsers,
        Self::AccessFinancials,
        Self::ManageContent,
    ];

    /// Label for audit logs and 403 pages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ViewDashboard => "view_dashboard",
            Self::ManageProducts => "manage_products",
            Self::ManageOrders => "manage_orders",
            Self::ManageUsers => "manage_users",
            Self::AccessFinancials => "access_financials",
            Self::ManageContent => "manage_content",
        }
    }
}

impl StaffRole {
    /// Whether this role grants `capability`.
    #[must_use]
    pub const fn allows(&self, capability: Capability) -> bool {
        match self {
            Self::SuperAdmin => true,
            Self::Admin => !matches!(capability, Capability::ManageUsers),
            Self::Manager => matches!(
                capability,
                Capability::ViewDashboard
                    | Capability::ManageProducts
                    | Capability::ManageOrders
                    | Capability::ManageContent
            ),
            Self::Support => matches!(
                capability,
                Capability::ViewDashboard | Capability::ManageOrders
            ),
        }
    }

    /// All capabilities this role grants.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| self.allows(*cap))
            .collect()
    }
}

/// Decide a capability check from the verified role, if any.
///
/// `None` means there is no authenticated, active staff member, which is always a denial.
#[must_use]
pub const fn is_allowed(verified_role: Option<StaffRole>, capability: Capability) -> bool {
    match verified_role {
        Some(role) => role.allows(capability),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_admin_has_everything() {
        assert_eq!(StaffRole::SuperAdmin.capabilities(), Capability::ALL.to_vec());
    }

    #[test]
    fn test_only_super_admin_manages_users() {
        for role in StaffRole::ALL {
            assert_eq!(
                role.allows(Capability::ManageUsers),
                role == StaffRole::SuperAdmin
            );
        }
    }

    #[test]
    fn test_financials_restricted_to_admins() {
        assert!(StaffRole::Admin.allows(Capability::AccessFinancials));
        assert!(!StaffRole::Manager.allows(Capability::AccessFinancials));
        assert!(!StaffRole::Support.allows(Capability::AccessFinancials));
    }

    #[test]
    fn test_support_is_orders_only() {
        assert_eq!(
            StaffRole::Support.capabilities(),
            vec![Capability::ViewDashboard, Capability::ManageOrders]
        );
    }

    #[test]
    fn test_no_role_denies_everything() {
        for cap in Capability::ALL {
            assert!(!is_allowed(None, cap));
        }
    }
}
