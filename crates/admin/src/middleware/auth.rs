//! Authentication and authorization extractors for admin.
//!
//! [`RequireStaff`] only checks that someone is signed in. [`Authorized`]
//! additionally asks the backend for the staff member's current role and
//! checks it against the capability named by its type parameter:
//!
//! ```rust,ignore
//! async fn update_product(
//!     auth: Authorized<require::ManageProducts>,
//!     State(state): State<AppState>,
//! ) -> Result<Redirect> { ... }
//! ```

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use timberline_core::StaffRole;
use timberline_core::authz::Capability;

use crate::error::set_sentry_user;
use crate::models::CurrentStaff;
use crate::services::auth::{StaffAuthService, current_staff};
use crate::state::AppState;

/// Extractor that requires a signed-in staff member.
///
/// Redirects to the login page for HTML requests, or returns 401 for
/// `/api/` and `/live/` requests.
pub struct RequireStaff(pub CurrentStaff);

/// Why a request was turned away.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API and stream requests).
    Unauthorized,
    /// Signed in, but the verified role lacks the capability.
    Forbidden(Capability),
    /// The role could not be verified.
    RoleUnavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden(capability) => (
                StatusCode::FORBIDDEN,
                format!("Your role does not allow {}", capability.as_str()),
            )
                .into_response(),
            Self::RoleUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Could not verify your permissions. Try again shortly.",
            )
                .into_response(),
        }
    }
}

fn unauthenticated(parts: &Parts) -> AuthRejection {
    let path = parts.uri.path();
    if path.starts_with("/api/") || path.starts_with("/live/") {
        AuthRejection::Unauthorized
    } else {
        AuthRejection::RedirectToLogin
    }
}

impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let Some(session) = parts.extensions.get::<Session>() else {
            return Err(unauthenticated(parts));
        };

        let staff = current_staff(session)
            .await
            .ok_or_else(|| unauthenticated(parts))?;

        set_sentry_user(staff.id.as_i32(), Some(staff.email.as_str()));
        Ok(Self(staff))
    }
}

/// A capability named at the type level.
pub trait RequiredCapability: Send + Sync + 'static {
    const CAPABILITY: Capability;
}

/// Marker types for [`Authorized`].
pub mod require {
    use super::{Capability, RequiredCapability};

    macro_rules! capability_markers {
        ($($name:ident),* $(,)?) => {
            $(
                #[doc = concat!("Requires `Capability::", stringify!($name), "`.")]
                pub struct $name;

                impl RequiredCapability for $name {
                    const CAPABILITY: Capability = Capability::$name;
                }
            )*
        };
    }

    capability_markers!(
        ViewDashboard,
        ManageProducts,
        ManageOrders,
        ManageUsers,
        AccessFinancials,
        ManageContent,
    );
}

/// A signed-in staff member whose server-verified role grants `C`.
pub struct Authorized<C> {
    pub staff: CurrentStaff,
    /// Role as reported by the backend for this request.
    pub role: StaffRole,
    _capability: PhantomData<C>,
}

impl<C: RequiredCapability> Authorized<C> {
    /// Check `staff` against the backend and build the guard.
    ///
    /// # Errors
    ///
    /// `Forbidden` when the role (or its absence) does not allow `C`,
    /// `RoleUnavailable` when the lookup itself fails.
    pub async fn verify(state: &AppState, staff: CurrentStaff) -> Result<Self, AuthRejection> {
        let role = StaffAuthService::new(state.tables())
            .verified_role(staff.id)
            .await
            .map_err(|e| {
                tracing::error!(staff_id = %staff.id, error = %e, "role lookup failed");
                AuthRejection::RoleUnavailable
            })?;

        match role {
            Some(role) if role.allows(C::CAPABILITY) => Ok(Self {
                staff,
                role,
                _capability: PhantomData,
            }),
            _ => {
                tracing::warn!(
                    staff_id = %staff.id,
                    role = ?role,
                    capability = C::CAPABILITY.as_str(),
                    "capability denied"
                );
                Err(AuthRejection::Forbidden(C::CAPABILITY))
            }
        }
    }
}

impl<C: RequiredCapability> FromRequestParts<AppState> for Authorized<C> {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireStaff(staff) = RequireStaff::from_request_parts(parts, state).await?;
        Self::verify(state, staff).await
    }
}
