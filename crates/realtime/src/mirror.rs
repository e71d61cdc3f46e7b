//! The live-table mirror.
//!
//! A [`LiveTableMirror`] collects (table, event) interests and one handler per
//! table, then [`activate`](LiveTableMirror::activate)s them into a
//! [`MirrorHandle`]. Activation opens one subscription per table on the
//! channel `"{channel}:{table}"`; a single dispatch task then runs the table's
//! handler (as its own task) for every matching notification.
//!
//! The handle owns everything. Dropping it, or awaiting
//! [`MirrorHandle::deactivate`], stops dispatch and closes the subscriptions.
//! Handlers already running finish, but nothing new starts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use timberline_core::Table;

use crate::collection::MirroredCollection;
use crate::error::BackendError;
use crate::feed::{ChangeEvent, ChangeFeed, ChangeNotification, EventFilter, Subscription};

/// Channel prefix used when none is given.
pub const DEFAULT_CHANNEL: &str = "db-changes";

const TOAST_CAPACITY: usize = 32;

/// Per-table change handler.
pub type ChangeHandler = Arc<dyn Fn(ChangeNotification) -> BoxFuture<'static, ()> + Send + Sync>;

/// Errors from [`LiveTableMirror::activate`].
#[derive(Debug, Error)]
pub enum MirrorError {
    /// `activate` was called with no `watch`.
    #[error("mirror has no table interests")]
    NothingWatched,

    /// A watched table has no handler.
    #[error("no change handler registered for {0}")]
    MissingHandler(Table),

    /// The change feed refused a subscription. Channels opened before it are released.
    #[error("failed to subscribe to {channel}: {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: BackendError,
    },
}

/// Whether a handle is still delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    Subscribed,
    Unsubscribed,
}

/// Short-lived user notification for a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub table: Table,
    pub event: ChangeEvent,
    pub message: String,
}

impl Toast {
    #[must_use]
    pub fn for_change(change: &ChangeNotification) -> Self {
        let noun = change.table.as_str().replace('_', " ");
        let message = match change.event {
            ChangeEvent::Insert => format!("New entry in {noun}"),
            ChangeEvent::Update => format!("{noun} updated"),
            ChangeEvent::Delete => format!("Entry removed from {noun}"),
        };
        Self {
            table: change.table,
            event: change.event,
            message,
        }
    }
}

/// Builder for a set of table subscriptions.
pub struct LiveTableMirror {
    feed: Arc<dyn ChangeFeed>,
    channel: String,
    interests: BTreeMap<Table, Vec<EventFilter>>,
    handlers: HashMap<Table, ChangeHandler>,
    notify: bool,
}

impl fmt::Debug for LiveTableMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveTableMirror")
            .field("channel", &self.channel)
            .field("interests", &self.interests)
            .field("notify", &self.notify)
            .finish_non_exhaustive()
    }
}

impl LiveTableMirror {
    #[must_use]
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self {
            feed,
            channel: DEFAULT_CHANNEL.to_string(),
            interests: BTreeMap::new(),
            handlers: HashMap::new(),
            notify: false,
        }
    }

    /// Channel prefix. Concurrent mirrors on the same table should use distinct names.
    #[must_use]
    pub fn channel(mut self, name: impl Into<String>) -> Self {
        self.channel = name.into();
        self
    }

    /// Register interest in `filter` events on `table`.
    #[must_use]
    pub fn watch(mut self, table: Table, filter: EventFilter) -> Self {
        let filters = self.interests.entry(table).or_default();
        if !filters.contains(&filter) {
            filters.push(filter);
        }
        self
    }

    /// Handler for `table`. A later call replaces an earlier one.
    #[must_use]
    pub fn on_change<F, Fut>(mut self, table: Table, handler: F) -> Self
    where
        F: Fn(ChangeNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers
            .insert(table, Arc::new(move |change| handler(change).boxed()));
        self
    }

    /// Watch every event on the collection's table and refetch it on each one.
    #[must_use]
    pub fn mirror<T: Send + Sync + 'static>(self, collection: &MirroredCollection<T>) -> Self {
        let table = collection.table();
        let weak = collection.downgrade();
        self.watch(table, EventFilter::All)
            .on_change(table, move |change| {
                let weak = weak.clone();
                async move {
                    match weak.refresh().await {
                        Ok(outcome) => {
                            tracing::debug!(%table, event = %change.event, ?outcome, "mirror refetched");
                        }
                        Err(e) => {
                            tracing::warn!(%table, error = %e, "mirror refetch failed, keeping last snapshot");
                        }
                    }
                }
            })
    }

    /// Emit a [`Toast`] for every dispatched change.
    #[must_use]
    pub const fn notify(mut self, enabled: bool) -> Self {
        self.notify = enabled;
        self
    }

    /// Open the subscriptions and start dispatching.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError`] if nothing is watched, a handler is missing, or
    /// the feed refuses a subscription. No subscription stays open on error.
    pub async fn activate(self) -> Result<MirrorHandle, MirrorError> {
        if self.interests.is_empty() {
            return Err(MirrorError::NothingWatched);
        }

        let mut routes = Vec::with_capacity(self.interests.len());
        for (table, filters) in self.interests {
            let handler = self
                .handlers
                .get(&table)
                .cloned()
                .ok_or(MirrorError::MissingHandler(table))?;
            let merged = filters
                .iter()
                .copied()
                .reduce(EventFilter::union)
                .unwrap_or_default();

            let channel = format!("{}:{table}", self.channel);
            let subscription = match self.feed.subscribe(&channel, table, merged).await {
                Ok(subscription) => subscription,
                Err(source) => {
                    tracing::warn!(%channel, error = %source, "live mirror subscription failed");
                    return Err(MirrorError::Subscribe { channel, source });
                }
            };

            routes.push(Route {
                subscription,
                filters,
                handler,
            });
        }

        let channels: Vec<String> = routes
            .iter()
            .map(|route| route.subscription.channel().to_string())
            .collect();
        tracing::info!(?channels, "live mirror subscribed");

        let active = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let (toasts, _) = broadcast::channel(TOAST_CAPACITY);

        let task = tokio::spawn(dispatch(
            routes,
            shutdown_rx,
            Arc::clone(&active),
            self.notify.then(|| toasts.clone()),
        ));

        Ok(MirrorHandle {
            active,
            channels,
            shutdown: Some(shutdown),
            task: Some(task),
            toasts,
        })
    }
}

struct Route {
    subscription: Subscription,
    filters: Vec<EventFilter>,
    handler: ChangeHandler,
}

fn route_stream(route: Route) -> BoxStream<'static, (ChangeNotification, ChangeHandler)> {
    stream::unfold(route, |mut route| async move {
        loop {
            let change = route.subscription.next().await?;
            if route.filters.iter().any(|f| f.matches(change.event)) {
                let handler = Arc::clone(&route.handler);
                return Some(((change, handler), route));
            }
        }
    })
    .boxed()
}

async fn dispatch(
    routes: Vec<Route>,
    mut shutdown: oneshot::Receiver<()>,
    active: Arc<AtomicBool>,
    toasts: Option<broadcast::Sender<Toast>>,
) {
    let mut changes = stream::select_all(routes.into_iter().map(route_stream));

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = changes.next() => {
                let Some((change, handler)) = next else {
                    tracing::warn!("change feed closed, live mirror stopping");
                    break;
                };
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                if let Some(toasts) = &toasts {
                    let _ = toasts.send(Toast::for_change(&change));
                }
                let active = Arc::clone(&active);
                tokio::spawn(async move {
                    if active.load(Ordering::SeqCst) {
                        handler(change).await;
                    }
                });
            }
        }
    }
}

/// Owner of an activated mirror.
pub struct MirrorHandle {
    active: Arc<AtomicBool>,
    channels: Vec<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    toasts: broadcast::Sender<Toast>,
}

impl fmt::Debug for MirrorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorHandle")
            .field("state", &self.state())
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl MirrorHandle {
    #[must_use]
    pub fn state(&self) -> MirrorState {
        let running = self.task.as_ref().is_some_and(|task| !task.is_finished());
        if running && self.active.load(Ordering::SeqCst) {
            MirrorState::Subscribed
        } else {
            MirrorState::Unsubscribed
        }
    }

    /// Full channel names, one per watched table.
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Toast stream. Empty unless the mirror was built with `notify(true)`.
    #[must_use]
    pub fn toasts(&self) -> broadcast::Receiver<Toast> {
        self.toasts.subscribe()
    }

    /// Stop dispatch and wait until every subscription is closed.
    pub async fn deactivate(mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "live mirror dispatch task failed");
        }
        tracing::info!(channels = ?self.channels, "live mirror unsubscribed");
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryBackend;

    fn counter_mirror(backend: &MemoryBackend, hits: &Arc<AtomicUsize>) -> LiveTableMirror {
        let hits = Arc::clone(hits);
        LiveTableMirror::new(Arc::new(backend.clone()))
            .watch(Table::Orders, EventFilter::Insert)
            .on_change(Table::Orders, move |_| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
            })
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_default_channel_and_state() {
        let backend = MemoryBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = counter_mirror(&backend, &hits).activate().await.unwrap();

        assert_eq!(handle.state(), MirrorState::Subscribed);
        assert_eq!(handle.channels(), ["db-changes:orders".to_string()]);
        assert_eq!(backend.active_channels(), vec!["db-changes:orders".to_string()]);

        handle.deactivate().await;
        assert!(backend.active_channels().is_empty());
    }

    #[tokio::test]
    async fn test_only_matching_events_run_handler() {
        let backend = MemoryBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _handle = counter_mirror(&backend, &hits).activate().await.unwrap();

        backend.publish(Table::Orders, ChangeEvent::Update, Some(1));
        backend.publish(Table::Products, ChangeEvent::Insert, Some(1));
        backend.publish(Table::Orders, ChangeEvent::Insert, Some(2));

        wait_for(|| hits.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_handler_and_empty_mirror() {
        let backend = MemoryBackend::new();
        let err = LiveTableMirror::new(Arc::new(backend.clone()))
            .activate()
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NothingWatched));

        let err = LiveTableMirror::new(Arc::new(backend.clone()))
            .watch(Table::Faqs, EventFilter::All)
            .activate()
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::MissingHandler(Table::Faqs)));
        assert!(backend.active_channels().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_releases_opened_channels() {
        let backend = MemoryBackend::new();
        backend.limit_subscriptions(Some(1));

        let err = LiveTableMirror::new(Arc::new(backend.clone()))
            .channel("admin")
            .watch(Table::Products, EventFilter::All)
            .watch(Table::Orders, EventFilter::All)
            .on_change(Table::Products, |_| async {})
            .on_change(Table::Orders, |_| async {})
            .activate()
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Subscribe { .. }));
        assert!(backend.active_channels().is_empty());
    }

    #[tokio::test]
    async fn test_toasts_when_notify_enabled() {
        let backend = MemoryBackend::new();
        let handle = LiveTableMirror::new(Arc::new(backend.clone()))
            .watch(Table::ContactSubmissions, EventFilter::Insert)
            .on_change(Table::ContactSubmissions, |_| async {})
            .notify(true)
            .activate()
            .await
            .unwrap();
        let mut toasts = handle.toasts();

        backend.publish(Table::ContactSubmissions, ChangeEvent::Insert, Some(4));
        let toast = tokio::time::timeout(Duration::from_secs(1), toasts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(toast.message, "New entry in contact submissions");
    }

    #[tokio::test]
    async fn test_drop_releases_subscriptions() {
        let backend = MemoryBackend::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = counter_mirror(&backend, &hits).activate().await.unwrap();
        drop(handle);

        wait_for(|| backend.active_channels().is_empty()).await;
    }
}
