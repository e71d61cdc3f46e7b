//! Storefront middleware.
//!
//! Applied in `main` from the outside in: Sentry, the `http_request` trace
//! span, request IDs, sessions, then security headers closest to the handler.

pub mod request_id;
pub mod security_headers;
pub mod session;

pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
