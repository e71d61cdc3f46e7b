//! Application state shared across handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use timberline_realtime::{ChangeFeed, TableClient};

use crate::config::AdminConfig;

/// Application state shared across all handlers.
///
/// Unlike the storefront there is no process-wide mirror: every open
/// `/live/{resource}` stream owns its own, so the admin only holds the two
/// backend collaborators.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    tables: Arc<dyn TableClient>,
    feed: Arc<dyn ChangeFeed>,
    live_streams: AtomicUsize,
}

impl AppState {
    #[must_use]
    pub fn new(config: AdminConfig, tables: Arc<dyn TableClient>, feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                tables,
                feed,
                live_streams: AtomicUsize::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    /// Remote table client.
    #[must_use]
    pub fn tables(&self) -> &dyn TableClient {
        self.inner.tables.as_ref()
    }

    /// Owned handle to the table client, for collections that outlive a request.
    #[must_use]
    pub fn tables_arc(&self) -> Arc<dyn TableClient> {
        Arc::clone(&self.inner.tables)
    }

    #[must_use]
    pub fn feed(&self) -> Arc<dyn ChangeFeed> {
        Arc::clone(&self.inner.feed)
    }

    /// Number of `/live` streams currently open.
    #[must_use]
    pub fn live_streams(&self) -> usize {
        self.inner.live_streams.load(Ordering::SeqCst)
    }

    /// Count a live stream for as long as the returned guard lives.
    #[must_use]
    pub fn track_live_stream(&self) -> LiveStreamGuard {
        self.inner.live_streams.fetch_add(1, Ordering::SeqCst);
        LiveStreamGuard {
            state: self.clone(),
        }
    }
}

/// Decrements the live stream count on drop.
pub struct LiveStreamGuard {
    state: AppState,
}

impl Drop for LiveStreamGuard {
    fn drop(&mut self) {
        self.state.inner.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use secrecy::SecretString;
    use serde_json::json;
    use timberline_core::{StaffRole, Table};
    use timberline_realtime::memory::MemoryBackend;
    use tower_sessions::{MemoryStore, Session};
    use url::Url;

    use super::*;
    use crate::models::CurrentStaff;
    use crate::services::auth::start_session;

    #[allow(clippy::unwrap_used)]
    pub fn config() -> AdminConfig {
        AdminConfig {
            database_url: SecretString::from("postgres://localhost/timberline_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3001,
            base_url: Url::parse("http://localhost:3001").unwrap(),
            session_secret: SecretString::from("Zt4!pX8@qL2#wN6$eR1%yU5^iO9&aS3*"),
            sentry: crate::config::SentryConfig::default(),
        }
    }

    pub fn state(backend: &MemoryBackend) -> AppState {
        AppState::new(config(), Arc::new(backend.clone()), Arc::new(backend.clone()))
    }

    /// Seed a staff row with `role` and return a session signed in as them.
    #[allow(clippy::unwrap_used)]
    pub async fn signed_in(backend: &MemoryBackend, role: StaffRole) -> (Session, CurrentStaff) {
        let id = i64::try_from(backend.rows(Table::StaffUsers).len()).unwrap() + 1;
        let email = format!("staff{id}@timberline.example");
        backend
            .seed(
                Table::StaffUsers,
                [json!({"id": id, "email": email, "name": format!("Staff {id}"), "role": role, "password_hash": "unused"})],
            )
            .unwrap();

        let staff = CurrentStaff {
            id: i32::try_from(id).unwrap().into(),
            email: timberline_core::Email::parse(&email).unwrap(),
            name: format!("Staff {id}"),
        };
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        start_session(&session, &staff).await.unwrap();
        (session, staff)
    }
}
