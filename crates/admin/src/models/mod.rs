//! Back-office domain models.
//!
//! Catalog, order, and content rows come from `timberline_core`; this module
//! adds the staff account types that only the back office needs.

pub mod session;
pub mod staff;

pub use session::{CurrentStaff, keys as session_keys};
pub use staff::{StaffCredentials, StaffUser};
