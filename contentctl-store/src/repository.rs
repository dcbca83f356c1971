//! Cache-aside repository for content items.
//!
//! Reads go cache first and fall through to the store, populating the cache
//! on the way back. Writes go to the store first; only after the store call
//! returns are the affected keys invalidated, and the invalidation is awaited
//! before the write returns.
//!
//! There is no transaction spanning both tiers. A reader racing a writer can
//! repopulate a key with the pre-write value between commit and invalidation;
//! that entry lives at most one TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{codec, Cache, Cacheable};
use crate::config::CacheConfig;
use crate::db::ContentStore;
use crate::error::Result;
use crate::models::{ContentItem, ItemFields};

/// Cache key layout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Full listing: `items:all`
    pub fn all(&self) -> String {
        format!("{}items:all", self.prefix)
    }

    /// Single item: `items:{id}`
    pub fn item(&self, id: i64) -> String {
        format!("{}items:{}", self.prefix, id)
    }

    /// Glob covering every item key
    pub fn pattern(&self) -> String {
        format!("{}items:*", self.prefix)
    }
}

/// Cache-aside access to content items.
///
/// Cheap to clone and safe to share across tasks; it keeps no per-call state.
#[derive(Clone)]
pub struct ContentRepository {
    store: Arc<dyn ContentStore>,
    cache: Arc<dyn Cache>,
    keys: CacheKeys,
    ttl: Duration,
}

impl ContentRepository {
    pub fn new(store: Arc<dyn ContentStore>, cache: Arc<dyn Cache>, config: &CacheConfig) -> Self {
        Self {
            store,
            cache,
            keys: CacheKeys::new(config.key_prefix.clone()),
            ttl: config.default_ttl(),
        }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    /// All items, newest first (ties by ascending id).
    pub async fn get_all(&self) -> Result<Vec<ContentItem>> {
        let key = self.keys.all();
        if let Some(items) = self.cached::<Vec<ContentItem>>(&key).await {
            debug!("Cache hit: {}", key);
            return Ok(items);
        }

        let items = self.store.list().await?;
        self.populate(&key, &items).await;
        Ok(items)
    }

    /// One item, or `None` if the id does not exist. Absence is not cached.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<ContentItem>> {
        let key = self.keys.item(id);
        if let Some(item) = self.cached::<ContentItem>(&key).await {
            debug!("Cache hit: {}", key);
            return Ok(Some(item));
        }

        let Some(item) = self.store.get(id).await? else {
            return Ok(None);
        };
        self.populate(&key, &item).await;
        Ok(Some(item))
    }

    /// Insert a new item and drop the cached listing.
    ///
    /// # Errors
    ///
    /// `StoreError::Validation` if title or body is empty; nothing is written.
    pub async fn create(&self, title: &str, body: &str) -> Result<ContentItem> {
        let fields = ItemFields::new(title, body)?;
        let item = self.store.insert(&fields).await?;

        self.invalidate(vec![self.keys.all()]).await;
        Ok(item)
    }

    /// Overwrite an item's title and body.
    ///
    /// `None` if no such id. On success both the item key and the listing are
    /// invalidated before this returns, so the caller's next read goes to the
    /// store.
    pub async fn update(&self, id: i64, title: &str, body: &str) -> Result<Option<ContentItem>> {
        let fields = ItemFields::new(title, body)?;
        let Some(item) = self.store.update(id, &fields).await? else {
            return Ok(None);
        };

        self.invalidate(vec![self.keys.item(id), self.keys.all()]).await;
        Ok(Some(item))
    }

    /// Delete an item; true if a row was removed.
    ///
    /// Keys are invalidated either way.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let removed = self.store.delete(id).await?;

        self.invalidate(vec![self.keys.item(id), self.keys.all()]).await;
        Ok(removed)
    }

    /// Drop every cached item key. Returns how many were removed.
    pub async fn purge_cache(&self) -> u64 {
        self.cache.delete_matching(&self.keys.pattern()).await
    }

    async fn cached<T: Cacheable>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        codec::decode(key, &raw)
    }

    async fn populate<T: Cacheable + Sync>(&self, key: &str, value: &T) {
        match codec::encode(value) {
            Ok(raw) => self.cache.set_with_ttl(key, raw, self.ttl).await,
            Err(e) => warn!("cache: failed to serialize {}: {}", key, e),
        }
    }

    async fn invalidate(&self, keys: Vec<String>) {
        debug!("Invalidating {}", keys.join(", "));
        self.cache.delete_keys(&keys).await;
    }
}
