//! HTTP middleware for admin.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors)
//! 2. `TraceLayer` (request spans with status and latency)
//! 3. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! Authentication and authorization are extractors rather than layers, so
//! each handler states the capability it needs in its signature.

pub mod auth;
pub mod session;

pub use auth::{AuthRejection, Authorized, RequireStaff, RequiredCapability, require};
pub use session::create_session_layer;
