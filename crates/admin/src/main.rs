//! Timberline Admin - staff back office.
//!
//! Serves the admin panel on port 3001.
//!
//! # Security
//!
//! Every request below `/auth` carries a signed-in staff session, and every
//! capability check asks the backend for the staff member's current role.
//! There is no bootstrap account and no fallback role: create the first
//! super admin with `timberline-cli staff create`.
//!
//! # Architecture
//!
//! - Axum web framework, Askama templates for server-side rendering
//! - Reads and writes through the shared `TableClient`
//! - `/live/{resource}` streams table refreshes over SSE, one mirror per connection
//! - `PostgreSQL`-backed sessions (`SameSite=Strict`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Request, Response, StatusCode};
use axum::{Json, Router, routing::get};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use sentry::integrations::tracing as sentry_tracing;
use timberline_admin::config::AdminConfig;
use timberline_admin::middleware::create_session_layer;
use timberline_admin::routes;
use timberline_admin::state::AppState;
use timberline_core::Table;
use timberline_realtime::Query;
use timberline_realtime::postgres::{PgChangeFeed, PgTableClient, create_pool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Start Sentry (when a DSN is set) and the tracing subscriber.
///
/// Hold the returned guard for the life of the process.
fn init_telemetry(config: &AdminConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry.dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.sentry.environment.clone().into()),
                sample_rate: config.sentry.sample_rate,
                traces_sample_rate: config.sentry.traces_sample_rate,
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    });

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "timberline_admin=info,timberline_realtime=info,tower_http=debug".into());

    // JSON on Fly.io, text locally
    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    let config = AdminConfig::from_env().expect("Failed to load configuration");
    let _sentry_guard = init_telemetry(&config);

    let pool = create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    let session_layer = create_session_layer(&pool, &config).expect("Failed to configure sessions");

    // Live tables are the point of this service, so a missing listener is fatal.
    let feed = PgChangeFeed::connect(&pool)
        .await
        .expect("Failed to start change listener");

    let state = AppState::new(
        config.clone(),
        Arc::new(PgTableClient::new(pool.clone())),
        Arc::new(feed),
    );

    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new("crates/admin/static"))
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record("latency_ms", u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state.clone())
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "admin listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!(open_streams = state.live_streams(), "admin stopped");
}

async fn health() -> &'static str {
    "ok"
}

/// Ready when the backend answers a staff table read.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let backend = state
        .tables()
        .select(Table::StaffUsers, &Query::new().limit(1))
        .await
        .is_ok();
    let status = if backend {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "backend": backend,
            "live_streams": state.live_streams(),
        })),
    )
}

/// Resolves on Ctrl+C, or on SIGTERM where there is one.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    tracing::info!("shutdown requested, closing live streams");
}
