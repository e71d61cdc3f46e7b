//! A replaceable local snapshot of one table.
//!
//! A [`MirroredCollection`] never merges: each refresh fetches the whole
//! selection and swaps the snapshot. Fetches are numbered when issued, and a
//! result is applied only if no later-issued fetch has already been applied,
//! so overlapping refreshes settle on the newest request.
//!
//! Change handlers hold a [`WeakCollection`]. When the owner drops the
//! collection, in-flight fetches finish but their results go nowhere.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use timberline_core::Table;

use crate::client::{TableClient, TableClientExt};
use crate::error::BackendError;
use crate::query::Query;

/// Produces a fresh copy of the collection.
pub type Fetcher<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, BackendError>> + Send + Sync>;

/// What happened to a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot was replaced.
    Applied,
    /// A later-issued fetch had already been applied.
    Superseded,
    /// The collection no longer exists.
    Dropped,
}

struct Shared<T> {
    table: Table,
    fetch: Fetcher<T>,
    snapshot: watch::Sender<Arc<Vec<T>>>,
    issued: AtomicU64,
    applied: Mutex<u64>,
}

impl<T> Shared<T> {
    fn apply(&self, seq: u64, rows: Vec<T>) -> RefreshOutcome {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= *applied {
            tracing::debug!(table = %self.table, seq, applied = *applied, "discarding superseded fetch");
            return RefreshOutcome::Superseded;
        }
        *applied = seq;
        self.snapshot.send_replace(Arc::new(rows));
        RefreshOutcome::Applied
    }
}

/// Owner of a mirrored table snapshot.
pub struct MirroredCollection<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for MirroredCollection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for MirroredCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirroredCollection")
            .field("table", &self.shared.table)
            .field("len", &self.shared.snapshot.borrow().len())
            .field("version", &self.version())
            .finish()
    }
}

impl<T: Send + Sync + 'static> MirroredCollection<T> {
    /// Empty collection refreshed by `fetch`.
    #[must_use]
    pub fn new(table: Table, fetch: Fetcher<T>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                table,
                fetch,
                snapshot,
                issued: AtomicU64::new(0),
                applied: Mutex::new(0),
            }),
        }
    }

    /// Collection of `table` rows matching `query`, decoded as `T`.
    #[must_use]
    pub fn from_client(client: Arc<dyn TableClient>, table: Table, query: Query) -> Self
    where
        T: DeserializeOwned,
    {
        let fetch: Fetcher<T> = Arc::new(move || {
            let client = Arc::clone(&client);
            let query = query.clone();
            async move { client.fetch::<T>(table, &query).await }.boxed()
        });
        Self::new(table, fetch)
    }
}

impl<T> MirroredCollection<T> {
    #[must_use]
    pub fn table(&self) -> Table {
        self.shared.table
    }

    /// The current rows.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.shared.snapshot.borrow())
    }

    /// Receiver that wakes on every applied refresh.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.shared.snapshot.subscribe()
    }

    /// Sequence number of the fetch behind the current snapshot (0 before the first).
    #[must_use]
    pub fn version(&self) -> u64 {
        *self
            .shared
            .applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakCollection<T> {
        WeakCollection {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Refetch the whole selection and replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<RefreshOutcome, BackendError> {
        self.downgrade().refresh().await
    }
}

/// Non-owning handle used by change handlers.
pub struct WeakCollection<T> {
    shared: Weak<Shared<T>>,
}

impl<T> Clone for WeakCollection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T> WeakCollection<T> {
    /// `true` once every owner has dropped the collection.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.shared.strong_count() == 0
    }

    /// Refetch if the collection still exists.
    ///
    /// No strong reference is held while the fetch is in flight.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<RefreshOutcome, BackendError> {
        let (seq, fetch) = {
            let Some(shared) = self.shared.upgrade() else {
                return Ok(RefreshOutcome::Dropped);
            };
            let seq = shared.issued.fetch_add(1, Ordering::SeqCst) + 1;
            (seq, (shared.fetch)())
        };

        let rows = fetch.await?;

        match self.shared.upgrade() {
            Some(shared) => Ok(shared.apply(seq, rows)),
            None => Ok(RefreshOutcome::Dropped),
        }
    }
}
