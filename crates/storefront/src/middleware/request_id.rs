//! Correlation IDs.
//!
//! A well-formed inbound `x-request-id` is reused, anything else is replaced
//! with a fresh UUID. The ID lands on the `http_request` span, on the Sentry
//! scope and on the response.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_INBOUND_LEN: usize = 128;

/// The correlation ID for the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    fn from_request(request: &Request) -> Self {
        let inbound = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|id| !id.is_empty() && id.len() <= MAX_INBOUND_LEN);

        Self(inbound.map_or_else(|| Uuid::new_v4().to_string(), str::to_owned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = RequestId::from_request(&request);

    tracing::Span::current().record("request_id", id.as_str());
    sentry::configure_scope(|scope| scope.set_tag("request_id", id.as_str()));
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    match HeaderValue::from_str(id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        Err(_) => tracing::debug!("request id is not a valid header value"),
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;

    use super::*;

    fn request(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(REQUEST_ID_HEADER, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn inbound_id_is_reused() {
        let id = RequestId::from_request(&request(Some("edge-42")));
        assert_eq!(id.as_str(), "edge-42");
    }

    #[test]
    fn oversized_or_missing_ids_are_replaced() {
        let long = "x".repeat(MAX_INBOUND_LEN + 1);
        let replaced = RequestId::from_request(&request(Some(&long)));
        assert!(Uuid::parse_str(replaced.as_str()).is_ok());

        let generated = RequestId::from_request(&request(None));
        assert!(Uuid::parse_str(generated.as_str()).is_ok());
    }
}
