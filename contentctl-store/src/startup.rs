//! Process startup wiring
//!
//! Builds every handle once, in dependency order, and hands them to the
//! caller: pool, then migrations (fatal on failure), then cache (degrades on
//! failure), then the repository over both.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{self, AnyCache};
use crate::config::Config;
use crate::db::{PgContentStore, Pool};
use crate::error::Result;
use crate::migrations::{MigrationReport, MigrationRunner};
use crate::repository::ContentRepository;

/// Everything a running process needs
pub struct Services {
    pub pool: Pool,
    pub cache: AnyCache,
    pub repository: ContentRepository,
    pub migrations: MigrationReport,
}

/// Connect, migrate and assemble the repository.
///
/// # Errors
///
/// Store connection failures and `StoreError::MigrationFailure` are returned;
/// the process must not serve traffic in either case. A cache that cannot be
/// reached is logged and the repository runs store-only.
pub async fn start(config: &Config) -> Result<Services> {
    let pool = Pool::connect(&config.database).await?;

    let migrations = MigrationRunner::from_config(pool.clone(), &config.migrations)?
        .run()
        .await?;

    let cache = cache::from_config(&config.cache)?;
    match cache.connect().await {
        Ok(()) => info!(url = %config.cache.url, "Cache ready"),
        Err(e) => warn!("Cache unavailable, serving from store only: {}", e),
    }

    let store = Arc::new(PgContentStore::new(pool.clone()));
    let repository = ContentRepository::new(store, cache.as_cache(), &config.cache);

    Ok(Services {
        pool,
        cache,
        repository,
        migrations,
    })
}

impl Services {
    /// Release store connections.
    pub async fn shutdown(self) {
        self.pool.close().await;
    }
}
