//! Back-office access follows the role the backend reports on each request.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;

use timberline_admin::models::StaffUser;
use timberline_admin::services::auth::StaffAuthService;
use timberline_core::StaffRole;
use timberline_integration_tests::{Browser, admin_app};
use timberline_realtime::BackendError;
use timberline_realtime::memory::MemoryBackend;

const PASSWORD: &str = "mortise and tenon";

async fn staff(backend: &MemoryBackend, email: &str, role: StaffRole) -> StaffUser {
    StaffAuthService::new(backend)
        .create_staff(email, "Staff Member", role, PASSWORD)
        .await
        .unwrap()
}

async fn signed_in(backend: &MemoryBackend, email: &str) -> Browser {
    let (app, _) = admin_app(backend);
    let mut browser = Browser::new(app);
    let page = browser
        .post("/auth/login", &[("email", email), ("password", PASSWORD)])
        .await;
    assert_eq!(page.status, StatusCode::SEE_OTHER, "login failed: {}", page.body);
    assert_eq!(page.location(), Some("/"));
    browser
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login() {
    let backend = MemoryBackend::new();
    let (app, _) = admin_app(&backend);
    let mut browser = Browser::new(app);

    let page = browser.get("/orders").await;
    assert_eq!(page.status, StatusCode::SEE_OTHER);
    assert_eq!(page.location(), Some("/auth/login"));

    let stream = browser.get("/live/orders").await;
    assert_eq!(stream.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let backend = MemoryBackend::new();
    staff(&backend, "clerk@timberline.example", StaffRole::Support).await;
    let (app, _) = admin_app(&backend);
    let mut browser = Browser::new(app);

    let page = browser
        .post(
            "/auth/login",
            &[("email", "clerk@timberline.example"), ("password", "not the password")],
        )
        .await;
    assert_eq!(page.status, StatusCode::UNAUTHORIZED);
    assert!(page.body.contains("Invalid email or password."));
}

#[tokio::test]
async fn role_changes_apply_to_open_sessions() {
    let backend = MemoryBackend::new();
    staff(&backend, "owner@timberline.example", StaffRole::SuperAdmin).await;
    let clerk = staff(&backend, "clerk@timberline.example", StaffRole::Support).await;

    let mut owner = signed_in(&backend, "owner@timberline.example").await;
    let mut session = signed_in(&backend, "clerk@timberline.example").await;

    assert_eq!(session.get("/orders").await.status, StatusCode::OK);
    assert_eq!(session.get("/discounts").await.status, StatusCode::FORBIDDEN);
    assert_eq!(session.get("/staff").await.status, StatusCode::FORBIDDEN);

    let promoted = owner
        .post(&format!("/staff/{}/role", clerk.id), &[("role", "admin")])
        .await;
    assert_eq!(promoted.status, StatusCode::SEE_OTHER);
    assert_eq!(session.get("/discounts").await.status, StatusCode::OK);

    let removed = owner
        .post(&format!("/staff/{}/deactivate", clerk.id), &[])
        .await;
    assert_eq!(removed.status, StatusCode::SEE_OTHER);
    assert_eq!(session.get("/orders").await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_role_lookup_denies_access() {
    let backend = MemoryBackend::new();
    staff(&backend, "owner@timberline.example", StaffRole::SuperAdmin).await;
    let mut session = signed_in(&backend, "owner@timberline.example").await;
    assert_eq!(session.get("/orders").await.status, StatusCode::OK);

    backend.register_rpc("staff_role", |_| {
        Err(BackendError::Database(sqlx::Error::PoolTimedOut))
    });

    let page = session.get("/orders").await;
    assert_eq!(page.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!page.body.contains("Orders</h1>"));
}
