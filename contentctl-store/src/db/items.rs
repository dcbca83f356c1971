//! Content item persistence
//!
//! `ContentStore` is the authoritative side of the cache-aside repository.
//! `PgContentStore` implements it over the pool; every call checks out one
//! connection for one statement.

use async_trait::async_trait;

use super::Pool;
use crate::error::Result;
use crate::models::{ContentItem, ItemFields};

const ITEM_COLUMNS: &str = "id, title, body, created_at, updated_at";

/// Authoritative storage for content items.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// All items, `created_at DESC, id ASC`.
    async fn list(&self) -> Result<Vec<ContentItem>>;

    async fn get(&self, id: i64) -> Result<Option<ContentItem>>;

    /// Insert; the store assigns id and both timestamps.
    async fn insert(&self, fields: &ItemFields) -> Result<ContentItem>;

    /// Overwrite title/body and bump `updated_at`. `None` if no row matched.
    async fn update(&self, id: i64, fields: &ItemFields) -> Result<Option<ContentItem>>;

    /// True if a row was removed.
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// Postgres-backed item store
#[derive(Clone, Debug)]
pub struct PgContentStore {
    pool: Pool,
}

impl PgContentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn list(&self) -> Result<Vec<ContentItem>> {
        let mut conn = self.pool.acquire().await?;
        let items = sqlx::query_as::<_, ContentItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_items ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&mut *conn)
        .await?;
        self.pool.release(conn);
        Ok(items)
    }

    async fn get(&self, id: i64) -> Result<Option<ContentItem>> {
        let mut conn = self.pool.acquire().await?;
        let item = sqlx::query_as::<_, ContentItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        self.pool.release(conn);
        Ok(item)
    }

    async fn insert(&self, fields: &ItemFields) -> Result<ContentItem> {
        let mut conn = self.pool.acquire().await?;
        let item = sqlx::query_as::<_, ContentItem>(&format!(
            "INSERT INTO content_items (title, body) VALUES ($1, $2) RETURNING {ITEM_COLUMNS}"
        ))
        .bind(fields.title.as_str())
        .bind(fields.body.as_str())
        .fetch_one(&mut *conn)
        .await?;
        self.pool.release(conn);
        Ok(item)
    }

    async fn update(&self, id: i64, fields: &ItemFields) -> Result<Option<ContentItem>> {
        let mut conn = self.pool.acquire().await?;
        let item = sqlx::query_as::<_, ContentItem>(&format!(
            r#"
            UPDATE content_items
            SET title = $1, body = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(fields.title.as_str())
        .bind(fields.body.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        self.pool.release(conn);
        Ok(item)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        self.pool.release(conn);
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::migrations::MigrationRunner;

    // Integration tests - run with DATABASE_URL set
    // cargo test -p contentctl-store -- --ignored

    async fn store() -> PgContentStore {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").expect("DATABASE_URL required"),
            ..DatabaseConfig::default()
        };
        let pool = Pool::connect(&config).await.expect("pool creation failed");
        MigrationRunner::new(pool.clone())
            .run()
            .await
            .expect("migrations failed");
        PgContentStore::new(pool)
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn insert_update_delete_roundtrip() {
        let store = store().await;

        let created = store
            .insert(&ItemFields::new("Hello", "World").unwrap())
            .await
            .unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let updated = store
            .update(created.id, &ItemFields::new("Hi", "World").unwrap())
            .await
            .unwrap()
            .expect("row exists");
        assert_eq!(updated.title, "Hi");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        assert!(store.delete(created.id).await.unwrap());
        assert!(!store.delete(created.id).await.unwrap());
        assert!(store.get(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn update_missing_row_is_none() {
        let store = store().await;
        let fields = ItemFields::new("a", "b").unwrap();
        assert!(store.update(i64::MAX, &fields).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn list_is_newest_first() {
        let store = store().await;
        for n in 0..3 {
            store
                .insert(&ItemFields::new(&format!("t{n}"), "b").unwrap())
                .await
                .unwrap();
        }

        let items = store.list().await.unwrap();
        let mut sorted = items.clone();
        sorted.sort_by(ContentItem::newest_first);
        assert_eq!(items, sorted);
    }
}
