//! Server-sent event streams that keep admin tables current.
//!
//! Each `/live/{resource}` connection owns a private mirror: a
//! [`MirroredCollection`] of the resource's table plus a [`LiveTableMirror`]
//! on its own channel (`live-{resource}-{uuid}`). Every change notification
//! refetches the whole table; the stream forwards each applied snapshot as a
//! `refresh` event and each change as a `toast` event.
//!
//! The collection, the [`MirrorHandle`](timberline_realtime::MirrorHandle),
//! and the live-stream guard all live inside the response stream, so a
//! client disconnect drops them and closes the subscription.

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::Stream;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use timberline_core::{StaffUserId, Table};
use timberline_core::authz::Capability;
use timberline_realtime::{LiveTableMirror, MirroredCollection, Query, Toast};

use crate::middleware::{AuthRejection, RequireStaff};
use crate::services::auth::StaffAuthService;
use crate::state::AppState;

/// A table that can be watched from the admin UI.
///
/// Staff accounts are deliberately absent: their rows carry password hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveResource {
    Products,
    Orders,
    Customers,
    Discounts,
    Inbox,
    Newsletter,
}

impl LiveResource {
    pub const ALL: [Self; 6] = [
        Self::Products,
        Self::Orders,
        Self::Customers,
        Self::Discounts,
        Self::Inbox,
        Self::Newsletter,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Customers => "customers",
            Self::Discounts => "discounts",
            Self::Inbox => "inbox",
            Self::Newsletter => "newsletter",
        }
    }

    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Products => Table::Products,
            Self::Orders => Table::Orders,
            Self::Customers => Table::Profiles,
            Self::Discounts => Table::DiscountCodes,
            Self::Inbox => Table::ContactSubmissions,
            Self::Newsletter => Table::NewsletterSubscribers,
        }
    }

    /// Same capability as the matching list page.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Products => Capability::ManageProducts,
            Self::Orders | Self::Customers => Capability::ManageOrders,
            Self::Discounts => Capability::AccessFinancials,
            Self::Inbox | Self::Newsletter => Capability::ManageContent,
        }
    }
}

impl FromStr for LiveResource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|r| r.as_str() == s).ok_or(())
    }
}

fn refresh_event(resource: LiveResource, version: u64, rows: &[Value]) -> Event {
    let payload = json!({
        "resource": resource.as_str(),
        "version": version,
        "rows": rows,
    });
    Event::default().event("refresh").data(payload.to_string())
}

fn toast_event(toast: &Toast) -> Event {
    let payload = json!({
        "table": toast.table,
        "event": toast.event.to_string(),
        "message": toast.message,
    });
    Event::default().event("toast").data(payload.to_string())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "message": message }).to_string())
}

async fn check_role(state: &AppState, staff_id: StaffUserId, resource: LiveResource) -> Result<(), AuthRejection> {
    let capability = resource.capability();
    match StaffAuthService::new(state.tables()).verified_role(staff_id).await {
        Ok(Some(role)) if role.allows(capability) => Ok(()),
        Ok(role) => {
            tracing::warn!(%staff_id, ?role, capability = capability.as_str(), "live stream denied");
            Err(AuthRejection::Forbidden(capability))
        }
        Err(e) => {
            tracing::error!(%staff_id, error = %e, "role lookup failed");
            Err(AuthRejection::RoleUnavailable)
        }
    }
}

enum Wake {
    Rows(bool),
    Toast(Result<Toast, RecvError>),
}

/// Open a live stream for `resource`.
///
/// Unknown resources are 404. The role is checked against the backend when
/// the stream opens and again before every event it sends; a demoted or
/// deactivated account gets an `error` event and the stream ends.
pub async fn stream(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Response {
    let Ok(resource) = LiveResource::from_str(&resource) else {
        return (StatusCode::NOT_FOUND, "Unknown live resource").into_response();
    };

    if let Err(rejection) = check_role(&state, staff.id, resource).await {
        return rejection.into_response();
    }

    Sse::new(live_events(state, staff.id, resource))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn live_events(
    state: AppState,
    staff_id: StaffUserId,
    resource: LiveResource,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = state.track_live_stream();
        let collection = MirroredCollection::<Value>::from_client(
            state.tables_arc(),
            resource.table(),
            Query::new().order_by("id", true),
        );
        let mut rows = collection.subscribe();

        if let Err(e) = collection.refresh().await {
            tracing::warn!(resource = resource.as_str(), error = %e, "live stream initial load failed");
            yield Ok(error_event("Could not load rows"));
        }

        let channel = format!("live-{}-{}", resource.as_str(), Uuid::new_v4());
        let handle = LiveTableMirror::new(state.feed())
            .channel(channel)
            .mirror(&collection)
            .notify(true)
            .activate()
            .await;

        let snapshot = Arc::clone(&rows.borrow_and_update());
        yield Ok(refresh_event(resource, collection.version(), &snapshot));

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(resource = resource.as_str(), error = %e, "live updates unavailable, serving last snapshot");
                yield Ok(error_event("Live updates are unavailable"));
                return;
            }
        };
        tracing::info!(resource = resource.as_str(), channels = ?handle.channels(), "live stream opened");

        let mut toasts = handle.toasts();
        loop {
            let wake = tokio::select! {
                changed = rows.changed() => Wake::Rows(changed.is_ok()),
                toast = toasts.recv() => Wake::Toast(toast),
            };

            if matches!(wake, Wake::Rows(true) | Wake::Toast(Ok(_)))
                && check_role(&state, staff_id, resource).await.is_err()
            {
                yield Ok(error_event("Your access to this view has changed"));
                break;
            }

            match wake {
                Wake::Rows(true) => {
                    let snapshot = Arc::clone(&rows.borrow_and_update());
                    yield Ok(refresh_event(resource, collection.version(), &snapshot));
                }
                Wake::Toast(Ok(toast)) => yield Ok(toast_event(&toast)),
                Wake::Toast(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(resource = resource.as_str(), skipped, "live stream dropped toasts");
                }
                Wake::Rows(false) | Wake::Toast(Err(RecvError::Closed)) => break,
            }
        }

        handle.deactivate().await;
        tracing::info!(resource = resource.as_str(), "live stream closed");
    }
}
