//! Cross-crate scenarios for Timberline.
//!
//! Both web services run in-process against a [`MemoryBackend`], driven
//! request by request through `tower::ServiceExt::oneshot`. A [`Browser`]
//! carries the session cookie between requests the way a real client would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p timberline-integration-tests
//! ```
//!
//! No database or running server is needed.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::{MemoryStore, SessionManagerLayer};
use url::Url;

use timberline_admin::config::AdminConfig;
use timberline_realtime::memory::MemoryBackend;
use timberline_storefront::config::{SentryConfig, StorefrontConfig};

pub fn admin_config() -> AdminConfig {
    AdminConfig {
        database_url: SecretString::from("postgres://localhost/timberline_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3001,
        base_url: Url::parse("http://localhost:3001").unwrap(),
        session_secret: SecretString::from("Zt4!pX8@qL2#wN6$eR1%yU5^iO9&aS3*"),
        sentry: SentryConfig::default(),
    }
}

pub fn storefront_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/timberline_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: Url::parse("http://localhost:3000").unwrap(),
        session_secret: SecretString::from("q8W#zL2!vN5@kR9$tY3^mB7&xC1*pD4%"),
        content_cache_ttl: Duration::from_secs(60),
        sentry: SentryConfig::default(),
    }
}

fn sessions() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default()).with_secure(false)
}

/// The back office wired to `backend`, with in-memory sessions.
pub fn admin_app(backend: &MemoryBackend) -> (Router, timberline_admin::state::AppState) {
    let state = timberline_admin::state::AppState::new(
        admin_config(),
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
    );
    let app = timberline_admin::routes::routes()
        .layer(sessions())
        .with_state(state.clone());
    (app, state)
}

/// The storefront wired to `backend`, catalog loaded and live.
pub async fn storefront_app(backend: &MemoryBackend) -> (Router, timberline_storefront::state::AppState) {
    let state = timberline_storefront::state::AppState::new(storefront_config(), Arc::new(backend.clone()));
    state.load_catalog().await;
    state.go_live(Arc::new(backend.clone())).await.unwrap();
    let app = timberline_storefront::routes::routes()
        .layer(sessions())
        .with_state(state.clone());
    (app, state)
}

/// A product row with the columns the scenarios care about.
pub fn product(id: i64, name: &str, category: &str, price: u32) -> Value {
    let slug = name.to_lowercase().replace(' ', "-");
    json!({
        "id": id,
        "name": name,
        "slug": slug,
        "category": category,
        "price": price.to_string(),
        "stock": 10,
        "rating": "4.5",
    })
}

/// Poll `check` until it holds, failing after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}

/// A response, read to the end.
#[derive(Debug)]
pub struct Page {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Page {
    /// `Location` header of a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }
}

/// Sends requests to one app, keeping its session cookie.
pub struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    #[must_use]
    pub const fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    pub async fn get(&mut self, path: &str) -> Page {
        let request = Request::get(path);
        self.send(request, Body::empty()).await
    }

    /// POST `fields` as `application/x-www-form-urlencoded`.
    pub async fn post(&mut self, path: &str, fields: &[(&str, &str)]) -> Page {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::post(path).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(body)).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> Page {
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response = self.app.clone().oneshot(request.body(body).unwrap()).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap_or_default();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Page {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}
