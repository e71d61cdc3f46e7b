//! Application state shared across handlers.

use std::sync::{Arc, Mutex, PoisonError};

use timberline_core::Table;
use timberline_core::catalog::Product;
use timberline_realtime::{
    ChangeFeed, EventFilter, LiveTableMirror, MirrorError, MirrorHandle, MirrorState,
    MirroredCollection, Query, TableClient,
};

use crate::config::StorefrontConfig;
use crate::content::ContentStore;

/// Channel prefix for the storefront's process-wide mirror.
pub const CATALOG_CHANNEL: &str = "storefront-catalog";

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The catalog is a live mirror of `products`;
/// content lists are cached and invalidated by the same mirror.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    tables: Arc<dyn TableClient>,
    catalog: MirroredCollection<Product>,
    content: ContentStore,
    live: Mutex<Option<MirrorHandle>>,
}

impl AppState {
    /// Build state over `tables`. The catalog starts empty; call
    /// [`AppState::load_catalog`] and [`AppState::go_live`] before serving.
    #[must_use]
    pub fn new(config: StorefrontConfig, tables: Arc<dyn TableClient>) -> Self {
        let catalog = MirroredCollection::from_client(
            Arc::clone(&tables),
            Table::Products,
            Query::new().order_by("id", true),
        );
        let content = ContentStore::new(Arc::clone(&tables), config.content_cache_ttl);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                tables,
                catalog,
                content,
                live: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Remote table client for writes and one-off reads.
    #[must_use]
    pub fn tables(&self) -> &dyn TableClient {
        self.inner.tables.as_ref()
    }

    /// The mirrored `products` table.
    #[must_use]
    pub fn catalog(&self) -> &MirroredCollection<Product> {
        &self.inner.catalog
    }

    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.inner.content
    }

    /// Initial catalog fetch. Failures are logged and the catalog stays empty
    /// until the next change notification triggers a refetch.
    pub async fn load_catalog(&self) {
        match self.inner.catalog.refresh().await {
            Ok(_) => {
                tracing::info!(products = self.inner.catalog.snapshot().len(), "catalog loaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial catalog load failed, serving an empty catalog");
            }
        }
    }

    /// Subscribe to product and content changes.
    ///
    /// Product changes refetch the catalog; content changes drop the cached list.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError`] if the feed refuses a subscription. The catalog
    /// keeps its last snapshot either way.
    pub async fn go_live(&self, feed: Arc<dyn ChangeFeed>) -> Result<(), MirrorError> {
        let mut mirror = LiveTableMirror::new(feed)
            .channel(CATALOG_CHANNEL)
            .mirror(&self.inner.catalog);

        for table in [Table::BlogPosts, Table::Faqs, Table::StoreLocations] {
            let content = self.inner.content.clone();
            mirror = mirror
                .watch(table, EventFilter::All)
                .on_change(table, move |change| {
                    let content = content.clone();
                    async move { content.invalidate(change.table).await }
                });
        }

        let handle = mirror.activate().await?;
        let previous = self
            .inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        drop(previous);
        Ok(())
    }

    /// `Subscribed` while the live mirror is running.
    #[must_use]
    pub fn live_state(&self) -> MirrorState {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(MirrorState::Unsubscribed, MirrorHandle::state)
    }

    /// Tear down the live mirror, waiting for its subscriptions to close.
    pub async fn shut_down(&self) {
        let handle = self
            .inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.deactivate().await;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use secrecy::SecretString;
    use timberline_realtime::memory::MemoryBackend;
    use url::Url;

    use super::*;
    use crate::config::SentryConfig;

    #[allow(clippy::unwrap_used)]
    pub fn config() -> StorefrontConfig {
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

    pub fn state(backend: &MemoryBackend) -> AppState {
        AppState::new(config(), Arc::new(backend.clone()))
    }
}
