//! Cache-aside behaviour of `ContentRepository` over in-memory doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use contentctl_store::cache::{Cache, MemoryCache, RedisCache};
use contentctl_store::config::CacheConfig;
use contentctl_store::db::ContentStore;
use contentctl_store::models::{ContentItem, ItemFields};
use contentctl_store::{ContentRepository, StoreError, ValidationError};
use tracing_subscriber::EnvFilter;

// === Doubles ===

/// Store double with a settable clock so tests can force timestamp ties.
#[derive(Default)]
struct InMemoryStore {
    rows: Mutex<Vec<ContentItem>>,
    next_id: Mutex<i64>,
    clock: Mutex<i64>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl InMemoryStore {
    fn set_clock(&self, secs: i64) {
        *self.clock.lock().unwrap() = secs;
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(*self.clock.lock().unwrap(), 0).unwrap()
    }

    fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn list(&self) -> contentctl_store::Result<Vec<ContentItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut items = self.rows.lock().unwrap().clone();
        items.sort_by(ContentItem::newest_first);
        Ok(items)
    }

    async fn get(&self, id: i64) -> contentctl_store::Result<Option<ContentItem>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().iter().find(|i| i.id == id).cloned())
    }

    async fn insert(&self, fields: &ItemFields) -> contentctl_store::Result<ContentItem> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let now = self.now();
        let item = ContentItem {
            id,
            title: fields.title.as_str().to_string(),
            body: fields.body.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(item.clone());
        Ok(item)
    }

    async fn update(
        &self,
        id: i64,
        fields: &ItemFields,
    ) -> contentctl_store::Result<Option<ContentItem>> {
        let now = self.now();
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.iter_mut().find(|i| i.id == id).map(|item| {
            item.title = fields.title.as_str().to_string();
            item.body = fields.body.as_str().to_string();
            item.updated_at = now;
            item.clone()
        }))
    }

    async fn delete(&self, id: i64) -> contentctl_store::Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|i| i.id != id);
        Ok(rows.len() < before)
    }
}

/// Store that is down: every call fails the way an exhausted pool does.
struct DownStore;

#[async_trait]
impl ContentStore for DownStore {
    async fn list(&self) -> contentctl_store::Result<Vec<ContentItem>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn get(&self, _id: i64) -> contentctl_store::Result<Option<ContentItem>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn insert(&self, _fields: &ItemFields) -> contentctl_store::Result<ContentItem> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn update(
        &self,
        _id: i64,
        _fields: &ItemFields,
    ) -> contentctl_store::Result<Option<ContentItem>> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn delete(&self, _id: i64) -> contentctl_store::Result<bool> {
        Err(sqlx::Error::PoolTimedOut.into())
    }
}

/// Memory cache that records every invalidation batch.
#[derive(Default)]
struct RecordingCache {
    inner: MemoryCache,
    deletes: Mutex<Vec<Vec<String>>>,
}

impl RecordingCache {
    fn deletes(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cache for RecordingCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete_keys(&self, keys: &[String]) {
        self.deletes.lock().unwrap().push(keys.to_vec());
        self.inner.delete_keys(keys).await
    }

    async fn delete_matching(&self, pattern: &str) -> u64 {
        self.inner.delete_matching(pattern).await
    }
}

struct Fixture {
    store: Arc<InMemoryStore>,
    cache: Arc<RecordingCache>,
    repo: ContentRepository,
}

/// Route repository logs through the test harness; `RUST_LOG=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(InMemoryStore::default());
    let cache = Arc::new(RecordingCache::default());
    let repo = ContentRepository::new(store.clone(), cache.clone(), &CacheConfig::default());
    Fixture { store, cache, repo }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// === Example scenarios ===

#[tokio::test]
async fn walkthrough_create_list_update_delete() {
    let f = fixture();

    // 1. create
    let created = f.repo.create("Hello", "World").await.unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.title, "Hello");
    assert_eq!(created.body, "World");
    assert_eq!(f.cache.deletes(), vec![keys(&["items:all"])]);

    // 2. list with a cold cache goes to the store and populates items:all
    let all = f.repo.get_all().await.unwrap();
    assert_eq!(all, vec![created.clone()]);
    assert_eq!(f.store.list_calls.load(Ordering::SeqCst), 1);
    assert!(f.cache.inner.contains("items:all"));

    // 3. update invalidates both keys; the next read sees the new title
    let updated = f.repo.update(1, "Hi", "World").await.unwrap().unwrap();
    assert_eq!(updated.title, "Hi");
    assert_eq!(f.cache.deletes().last().unwrap(), &keys(&["items:1", "items:all"]));
    let fetched = f.repo.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Hi");
    assert_eq!(fetched.body, "World");

    // 4. delete removes the row
    assert!(f.repo.delete(1).await.unwrap());
    assert_eq!(f.repo.get_by_id(1).await.unwrap(), None);

    // 5. deleting again is false, not an error, and still invalidates
    let before = f.cache.deletes().len();
    assert!(!f.repo.delete(1).await.unwrap());
    assert_eq!(f.cache.deletes().len(), before + 1);
    assert_eq!(f.cache.deletes().last().unwrap(), &keys(&["items:1", "items:all"]));
}

#[tokio::test]
async fn create_with_empty_field_writes_nothing() {
    let f = fixture();

    let err = f.repo.create("", "x").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::Empty { field: "title" })
    ));

    let err = f.repo.create("x", "   ").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::Empty { field: "body" })
    ));

    assert_eq!(f.store.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.store.row_count(), 0);
    assert!(f.cache.deletes().is_empty());
}

#[tokio::test]
async fn update_with_empty_field_is_rejected() {
    let f = fixture();
    let item = f.repo.create("Hello", "World").await.unwrap();

    let err = f.repo.update(item.id, "Hi", "").await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(f.repo.get_by_id(item.id).await.unwrap().unwrap().body, "World");
}

// === Properties ===

#[tokio::test]
async fn create_then_get_by_id_matches() {
    let f = fixture();
    for (title, body) in [("a", "b"), ("Hello", "World"), ("ünïcode", "✓ body")] {
        let created = f.repo.create(title, body).await.unwrap();
        let fetched = f.repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, title);
        assert_eq!(fetched.body, body);
    }
}

#[tokio::test]
async fn no_stale_read_after_update() {
    let f = fixture();
    let item = f.repo.create("Before", "old body").await.unwrap();

    // Warm both keys
    f.repo.get_by_id(item.id).await.unwrap();
    f.repo.get_all().await.unwrap();
    assert!(f.cache.inner.contains("items:1"));

    f.repo.update(item.id, "After", "new body").await.unwrap();

    let fetched = f.repo.get_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "After");
    assert_eq!(fetched.body, "new body");
    let listed = f.repo.get_all().await.unwrap();
    assert_eq!(listed[0].title, "After");
}

#[tokio::test]
async fn update_missing_id_is_none_without_invalidation() {
    let f = fixture();
    assert_eq!(f.repo.update(404, "t", "b").await.unwrap(), None);
    assert!(f.cache.deletes().is_empty());
}

#[tokio::test]
async fn missing_id_is_not_cached() {
    let f = fixture();

    assert_eq!(f.repo.get_by_id(99).await.unwrap(), None);
    assert!(!f.cache.inner.contains("items:99"));

    // The second lookup goes back to the store
    assert_eq!(f.repo.get_by_id(99).await.unwrap(), None);
    assert_eq!(f.store.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn get_by_id_serves_second_read_from_cache() {
    let f = fixture();
    let item = f.repo.create("Hello", "World").await.unwrap();

    f.repo.get_by_id(item.id).await.unwrap();
    f.repo.get_by_id(item.id).await.unwrap();
    assert_eq!(f.store.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn listing_order_is_stable_across_cache_and_store() {
    let f = fixture();

    f.store.set_clock(100);
    f.repo.create("first", "b").await.unwrap(); // id 1 @100
    f.repo.create("second", "b").await.unwrap(); // id 2 @100 (tie)
    f.store.set_clock(200);
    f.repo.create("third", "b").await.unwrap(); // id 3 @200
    f.store.set_clock(50);
    f.repo.create("oldest", "b").await.unwrap(); // id 4 @50

    let from_store = f.repo.get_all().await.unwrap();
    let ids: Vec<i64> = from_store.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![3, 1, 2, 4]);

    let from_cache = f.repo.get_all().await.unwrap();
    assert_eq!(f.store.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(from_cache, from_store);
}

#[tokio::test]
async fn create_invalidates_listing() {
    let f = fixture();
    f.repo.create("one", "b").await.unwrap();
    assert_eq!(f.repo.get_all().await.unwrap().len(), 1);

    f.repo.create("two", "b").await.unwrap();
    assert_eq!(f.repo.get_all().await.unwrap().len(), 2);
    assert_eq!(f.store.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corrupt_cache_entry_falls_back_to_store() {
    let f = fixture();
    let item = f.repo.create("Hello", "World").await.unwrap();

    f.cache
        .set_with_ttl("items:1", "{\"garbage\":true}".to_string(), Duration::from_secs(60))
        .await;

    let fetched = f.repo.get_by_id(item.id).await.unwrap().unwrap();
    assert_eq!(fetched, item);
    assert_eq!(f.store.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ttl_comes_from_config() {
    let store = Arc::new(InMemoryStore::default());
    let cache = Arc::new(MemoryCache::new());
    let config = CacheConfig {
        default_ttl_secs: 1,
        ..CacheConfig::default()
    };
    let repo = ContentRepository::new(store.clone(), cache.clone(), &config);

    tokio::time::pause();
    repo.get_all().await.unwrap();
    assert!(cache.contains("items:all"));
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!cache.contains("items:all"));
}

#[tokio::test]
async fn purge_cache_drops_item_keys() {
    let f = fixture();
    f.repo.create("Hello", "World").await.unwrap();
    f.repo.get_by_id(1).await.unwrap();
    f.repo.get_all().await.unwrap();
    f.cache
        .set_with_ttl("sessions:1", "x".to_string(), Duration::from_secs(60))
        .await;

    assert_eq!(f.repo.purge_cache().await, 2);
    assert_eq!(f.cache.inner.keys(), vec!["sessions:1"]);
}

// === Failure isolation ===

#[tokio::test]
async fn unavailable_cache_degrades_to_store_only() {
    let store = Arc::new(InMemoryStore::default());
    let cache = Arc::new(
        RedisCache::new(&CacheConfig {
            url: "redis://127.0.0.1:1".to_string(),
            max_reconnect_attempts: 1,
            reconnect_base_delay_ms: 1,
            ..CacheConfig::default()
        })
        .unwrap(),
    );
    assert!(cache.connect().await.is_err());
    let repo = ContentRepository::new(store.clone(), cache, &CacheConfig::default());

    let created = repo.create("Hello", "World").await.unwrap();
    assert_eq!(repo.get_all().await.unwrap(), vec![created.clone()]);
    assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));
    repo.update(created.id, "Hi", "World").await.unwrap();
    assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().title, "Hi");
    assert!(repo.delete(created.id).await.unwrap());

    // Every read went to the store
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn store_outage_surfaces_connection_error() {
    let cache = Arc::new(MemoryCache::new());
    let repo = ContentRepository::new(Arc::new(DownStore), cache, &CacheConfig::default());

    assert!(repo.get_all().await.unwrap_err().is_connection());
    assert!(repo.get_by_id(1).await.unwrap_err().is_connection());
    assert!(repo.create("a", "b").await.unwrap_err().is_connection());
    assert!(repo.update(1, "a", "b").await.unwrap_err().is_connection());
    assert!(repo.delete(1).await.unwrap_err().is_connection());
}

#[tokio::test]
async fn store_outage_does_not_touch_cache() {
    let cache = Arc::new(RecordingCache::default());
    let repo = ContentRepository::new(Arc::new(DownStore), cache.clone(), &CacheConfig::default());

    assert!(repo.delete(1).await.is_err());
    assert!(cache.deletes().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_repository() {
    let f = fixture();
    let repo = Arc::new(f.repo.clone());

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move {
                let item = repo.create(&format!("t{n}"), "b").await.unwrap();
                repo.get_by_id(item.id).await.unwrap().unwrap();
                repo.get_all().await.unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked");
    }

    let all = f.repo.get_all().await.unwrap();
    assert_eq!(all.len(), 16);
}
