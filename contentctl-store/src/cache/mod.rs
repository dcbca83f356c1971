//! Cache tier
//!
//! The cache is an optimization only. [`Cache`] operations are total: a miss,
//! a timeout and an unreachable server all look the same to the caller, and
//! writes are best-effort. Errors surface only from explicit calls such as
//! [`RedisCache::connect`] and [`RedisCache::ping`].

mod client;
pub mod codec;
mod memory;
mod state;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CacheConfig;
use crate::error::{Result, StoreError};

pub use client::RedisCache;
pub use codec::Cacheable;
pub use memory::MemoryCache;
pub use state::{ConnectionState, ReconnectPolicy};

/// Internal cache failures. Never returned by [`Cache`] operations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache unavailable ({0})")]
    Unavailable(ConnectionState),

    #[error("cache did not answer within {0:?}")]
    Timeout(Duration),

    #[error("cache gave up after {attempts} reconnection attempts")]
    Exhausted { attempts: u32 },

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Key-value cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Stored value, or `None` on miss or when the cache is unusable.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value` for `ttl`. No-op when the cache is unusable.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration);

    /// Remove `keys`; absent keys are ignored. No-op when the cache is unusable.
    async fn delete_keys(&self, keys: &[String]);

    /// Remove every key matching a Redis-style glob `pattern` (`*`, `?`, `[...]`).
    ///
    /// Walks the keyspace; meant for maintenance, not request paths.
    /// Returns how many keys were removed.
    async fn delete_matching(&self, pattern: &str) -> u64;
}

/// Build the cache named by `config.url`: `memory://` or a Redis URL.
///
/// The returned cache is not connected yet; see [`RedisCache::connect`].
pub fn from_config(config: &CacheConfig) -> Result<AnyCache> {
    if config.url.starts_with("memory://") {
        return Ok(AnyCache::Memory(Arc::new(MemoryCache::new())));
    }
    let redis = RedisCache::new(config)
        .map_err(|e| StoreError::config(format!("invalid cache url '{}': {}", config.url, e)))?;
    Ok(AnyCache::Redis(Arc::new(redis)))
}

/// A configured cache handle of either kind.
#[derive(Clone, Debug)]
pub enum AnyCache {
    Redis(Arc<RedisCache>),
    Memory(Arc<MemoryCache>),
}

impl AnyCache {
    /// Open the session. Memory caches are always ready.
    pub async fn connect(&self) -> std::result::Result<(), CacheError> {
        match self {
            Self::Redis(cache) => cache.connect().await,
            Self::Memory(_) => Ok(()),
        }
    }

    pub async fn ping(&self) -> std::result::Result<(), CacheError> {
        match self {
            Self::Redis(cache) => cache.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Redis(cache) => cache.state(),
            Self::Memory(_) => ConnectionState::Ready,
        }
    }

    /// Shared handle for the repository.
    pub fn as_cache(&self) -> Arc<dyn Cache> {
        match self {
            Self::Redis(cache) => Arc::clone(cache) as Arc<dyn Cache>,
            Self::Memory(cache) => Arc::clone(cache) as Arc<dyn Cache>,
        }
    }
}
