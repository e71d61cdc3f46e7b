//! [`ChangeFeed`] over `LISTEN/NOTIFY`.
//!
//! One `PgListener` per process forwards trigger payloads into a [`ChangeHub`].
//! Subscriptions are hub receivers, so opening one costs no database round-trip.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;

use timberline_core::Table;

use crate::error::BackendError;
use crate::feed::{ChangeFeed, ChangeHub, ChangeNotification, EventFilter, Subscription};

/// `NOTIFY` channel written by the table triggers.
pub const CHANGE_CHANNEL: &str = "timberline_changes";

struct ListenerTask(JoinHandle<()>);

impl Drop for ListenerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Change feed fed by a background `PgListener`.
#[derive(Clone)]
pub struct PgChangeFeed {
    hub: ChangeHub,
    task: Arc<ListenerTask>,
}

impl std::fmt::Debug for PgChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgChangeFeed")
            .field("hub", &self.hub)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PgChangeFeed {
    /// Start listening on [`CHANGE_CHANNEL`].
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Database` if the listener cannot connect.
    pub async fn connect(pool: &PgPool) -> Result<Self, BackendError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let hub = ChangeHub::default();
        let forward = hub.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<ChangeNotification>(notification.payload()) {
                            Ok(change) => {
                                tracing::debug!(table = %change.table, event = %change.event, id = ?change.id, "row change");
                                forward.publish(change);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, payload = notification.payload(), "ignoring malformed change payload");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "change listener stopped");
                        break;
                    }
                }
            }
        });

        tracing::info!(channel = CHANGE_CHANNEL, "listening for row changes");

        Ok(Self {
            hub,
            task: Arc::new(ListenerTask(handle)),
        })
    }

    /// `false` once the listener task has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.0.is_finished()
    }

    /// Channels with an open subscription.
    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        self.hub.active_channels()
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(
        &self,
        channel: &str,
        table: Table,
        filter: EventFilter,
    ) -> Result<Subscription, BackendError> {
        if !self.is_running() {
            return Err(BackendError::Subscribe(format!(
                "listener on {CHANGE_CHANNEL} is not running"
            )));
        }
        Ok(self.hub.open(channel, table, filter))
    }
}
