//! Timberline Storefront - public furniture shop.
//!
//! Serves the storefront on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, Askama templates for server-side rendering
//! - `products` mirrored in memory and refetched on every row change
//!   (`LISTEN timberline_changes`)
//! - Blog, FAQ, and store pages cached with moka, invalidated by the same feed
//! - Cart in a `PostgreSQL`-backed session; checkout writes orders directly

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::{Json, Router, routing::get};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use sentry::integrations::tracing as sentry_tracing;
use timberline_realtime::MirrorState;
use timberline_realtime::postgres::{PgChangeFeed, PgTableClient, create_pool};
use timberline_storefront::config::StorefrontConfig;
use timberline_storefront::state::AppState;
use timberline_storefront::{middleware, routes};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Start Sentry (when a DSN is set) and the tracing subscriber.
///
/// The returned guard flushes Sentry on drop, so `main` must hold it.
fn init_telemetry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    // Sentry first so its tracing layer finds a client
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
        .unwrap_or_else(|_| "timberline_storefront=info,timberline_realtime=info,tower_http=debug".into());

    // JSON on Fly.io, human-readable locally
    let fmt_layer = if std::env::var("FLY_APP_NAME").is_ok() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    // Warnings and errors become Sentry events, info and debug breadcrumbs
    let sentry_layer = sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_layer)
        .init();

    if guard.is_some() {
        tracing::info!("Sentry initialized");
    }
    guard
}

#[tokio::main]
async fn main() {
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    let _sentry_guard = init_telemetry(&config);

    let pool = create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    let session_layer =
        middleware::create_session_layer(&pool, &config).expect("Failed to configure sessions");

    // Schema changes go through `timberline-cli migrate`, never startup.
    let state = AppState::new(config.clone(), Arc::new(PgTableClient::new(pool.clone())));
    state.load_catalog().await;
    go_live(&state, &pool).await;

    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new("crates/storefront/static"))
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state.clone())
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, products = state.catalog().snapshot().len(), "storefront listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    state.shut_down().await;
    tracing::info!("live catalog closed");
}

/// Subscribe the catalog to row changes.
///
/// A shop with a stale catalog beats no shop, so failures only log.
async fn go_live(state: &AppState, pool: &sqlx::PgPool) {
    let result = match PgChangeFeed::connect(pool).await {
        Ok(feed) => state.go_live(Arc::new(feed)).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(error) = result {
        tracing::warn!(%error, "live catalog updates unavailable, serving the loaded snapshot");
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Ready once the catalog has loaded and the live mirror is subscribed.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let catalog_loaded = state.catalog().version() > 0;
    let live = state.live_state() == MirrorState::Subscribed;
    let status = if catalog_loaded && live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "catalog_loaded": catalog_loaded,
            "products": state.catalog().snapshot().len(),
            "live": live,
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

    tracing::info!("shutdown requested, draining connections");
}
