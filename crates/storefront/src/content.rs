//! Cached content lists: blog posts, FAQs, and store locations.
//!
//! These tables change rarely, so each list is held in a moka cache for
//! `CONTENT_CACHE_TTL_SECS`. The storefront's live mirror also invalidates the
//! matching entry whenever a row changes, so edits show up before the TTL ends.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use timberline_core::Table;
use timberline_core::content::{BlogPost, Faq, StoreLocation};
use timberline_realtime::{BackendError, Query, TableClient, TableClientExt};

type Loaded<T> = Result<Arc<Vec<T>>, Arc<BackendError>>;

/// Read-through cache over the content tables.
#[derive(Clone)]
pub struct ContentStore {
    tables: Arc<dyn TableClient>,
    posts: Cache<(), Arc<Vec<BlogPost>>>,
    faqs: Cache<(), Arc<Vec<Faq>>>,
    stores: Cache<(), Arc<Vec<StoreLocation>>>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("posts_cached", &self.posts.contains_key(&()))
            .field("faqs_cached", &self.faqs.contains_key(&()))
            .field("stores_cached", &self.stores.contains_key(&()))
            .finish_non_exhaustive()
    }
}

fn cache<V: Clone + Send + Sync + 'static>(ttl: Duration) -> Cache<(), V> {
    Cache::builder().max_capacity(1).time_to_live(ttl).build()
}

impl ContentStore {
    #[must_use]
    pub fn new(tables: Arc<dyn TableClient>, ttl: Duration) -> Self {
        Self {
            tables,
            posts: cache(ttl),
            faqs: cache(ttl),
            stores: cache(ttl),
        }
    }

    /// Published posts, newest first.
    ///
    /// # Errors
    ///
    /// Returns the load error; it is not cached.
    pub async fn published_posts(&self) -> Loaded<BlogPost> {
        let tables = Arc::clone(&self.tables);
        self.posts
            .try_get_with((), async move {
                let query = Query::new()
                    .eq("published", true)
                    .order_by("published_at", false);
                tables
                    .fetch::<BlogPost>(Table::BlogPosts, &query)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// A published post by slug.
    ///
    /// # Errors
    ///
    /// Returns the load error; `Ok(None)` if no published post has that slug.
    pub async fn post(&self, slug: &str) -> Result<Option<BlogPost>, Arc<BackendError>> {
        let posts = self.published_posts().await?;
        Ok(posts.iter().find(|post| post.slug == slug).cloned())
    }

    /// FAQs in display order.
    ///
    /// # Errors
    ///
    /// Returns the load error; it is not cached.
    pub async fn faqs(&self) -> Loaded<Faq> {
        let tables = Arc::clone(&self.tables);
        self.faqs
            .try_get_with((), async move {
                let query = Query::new().order_by("position", true).order_by("id", true);
                tables.fetch::<Faq>(Table::Faqs, &query).await.map(Arc::new)
            })
            .await
    }

    /// Store locations ordered by city.
    ///
    /// # Errors
    ///
    /// Returns the load error; it is not cached.
    pub async fn stores(&self) -> Loaded<StoreLocation> {
        let tables = Arc::clone(&self.tables);
        self.stores
            .try_get_with((), async move {
                let query = Query::new().order_by("city", true).order_by("name", true);
                tables
                    .fetch::<StoreLocation>(Table::StoreLocations, &query)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    /// Drop the cached list for `table`, if it is a content table.
    pub async fn invalidate(&self, table: Table) {
        match table {
            Table::BlogPosts => self.posts.invalidate(&()).await,
            Table::Faqs => self.faqs.invalidate(&()).await,
            Table::StoreLocations => self.stores.invalidate(&()).await,
            _ => return,
        }
        tracing::debug!(%table, "content cache invalidated");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use timberline_realtime::memory::MemoryBackend;

    use super::*;

    fn backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .seed(
                Table::BlogPosts,
                [
                    json!({"id": 1, "slug": "oak-care", "title": "Caring for oak", "excerpt": "", "body": "Oil it.", "published": true, "published_at": "2026-03-01T00:00:00Z"}),
                    json!({"id": 2, "slug": "draft", "title": "Draft", "excerpt": "", "body": "", "published": false, "published_at": null}),
                    json!({"id": 3, "slug": "small-spaces", "title": "Small spaces", "excerpt": "", "body": "Go vertical.", "published": true, "published_at": "2026-05-01T00:00:00Z"}),
                ],
            )
            .unwrap();
        backend
            .seed(
                Table::Faqs,
                [
                    json!({"id": 1, "question": "Returns?", "answer": "30 days.", "position": 2}),
                    json!({"id": 2, "question": "Delivery?", "answer": "2 weeks.", "position": 1}),
                ],
            )
            .unwrap();
        backend
    }

    fn store(backend: &MemoryBackend) -> ContentStore {
        ContentStore::new(Arc::new(backend.clone()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_published_posts_hide_drafts_newest_first() {
        let content = store(&backend());
        let posts = content.published_posts().await.unwrap();
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["small-spaces", "oak-care"]);

        assert!(content.post("draft").await.unwrap().is_none());
        assert_eq!(content.post("oak-care").await.unwrap().unwrap().title, "Caring for oak");
    }

    #[tokio::test]
    async fn test_faqs_follow_position() {
        let content = store(&backend());
        let faqs = content.faqs().await.unwrap();
        assert_eq!(faqs.first().unwrap().question, "Delivery?");
    }

    #[tokio::test]
    async fn test_lists_are_cached_until_invalidated() {
        let backend = backend();
        let content = store(&backend);

        content.faqs().await.unwrap();
        let calls = backend.select_calls();
        content.faqs().await.unwrap();
        assert_eq!(backend.select_calls(), calls);

        content.invalidate(Table::Faqs).await;
        content.faqs().await.unwrap();
        assert_eq!(backend.select_calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_load_errors_are_not_cached() {
        let backend = backend();
        let content = store(&backend);

        backend.fail_selects(true);
        assert!(content.stores().await.is_err());

        backend.fail_selects(false);
        assert!(content.stores().await.unwrap().is_empty());
    }
}
