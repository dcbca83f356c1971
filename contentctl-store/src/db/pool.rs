//! Database connection pool management
//!
//! Wraps sqlx `PgPool` with explicit size, idle and connect limits.
//! Connections evicted for idleness are reopened by the next `acquire`.

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, StoreError};

/// Bounded pool of store connections.
///
/// Cheap to clone; all clones share the same connections.
#[derive(Clone, Debug)]
pub struct Pool {
    inner: PgPool,
}

/// Translate config into sqlx pool options.
///
/// The connect timeout doubles as the acquire timeout: a caller waiting on a
/// full pool gives up after the same bound as a caller waiting on a new socket.
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(0)
        .idle_timeout(Some(config.idle_timeout()))
        .acquire_timeout(config.connect_timeout())
}

impl Pool {
    /// Create the pool and open its first connection.
    ///
    /// # Errors
    ///
    /// `StoreError::Connection` if the store refuses, or
    /// `StoreError::ConnectTimeout` if it does not answer within
    /// `connect_timeout_ms`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let pool = Pool::connect(&config.database).await?;
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let timeout = config.connect_timeout();
        let pending = pool_options(config).connect(&config.url);
        let inner = match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::ConnectTimeout(timeout)),
        };

        info!(
            max_connections = config.max_connections,
            idle_timeout_secs = config.idle_timeout_secs,
            "Connected to store"
        );
        Ok(Self { inner })
    }

    /// Create the pool without opening any connection yet.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let inner = pool_options(config).connect_lazy(&config.url)?;
        Ok(Self { inner })
    }

    /// Check out a connection, waiting up to the acquire timeout.
    ///
    /// Callers beyond the pool size queue here; on timeout this fails with
    /// `StoreError::Connection`.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        let conn = self.inner.acquire().await?;
        debug!(
            size = self.inner.size(),
            idle = self.inner.num_idle(),
            "Acquired store connection"
        );
        Ok(conn)
    }

    /// Hand a connection back to the pool.
    ///
    /// Dropping the handle does the same; this exists so call sites can make
    /// the hand-back explicit.
    pub fn release(&self, conn: PoolConnection<Postgres>) {
        drop(conn);
    }

    /// Underlying sqlx pool, for single-statement queries.
    pub fn pg(&self) -> &PgPool {
        &self.inner
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.inner.options().get_acquire_timeout()
    }

    /// Close every connection and refuse further acquires.
    pub async fn close(&self) {
        self.inner.close().await;
        info!("Store pool closed");
    }
}
