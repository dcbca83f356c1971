//! Connectivity check for both tiers

use anyhow::{anyhow, Context, Result};
use contentctl_store::cache;
use contentctl_store::db::Pool;
use contentctl_store::Config;

/// Query the store version and ping the cache. Fails if either is down.
pub async fn run_check(config: &Config) -> Result<()> {
    let store = check_store(config).await;
    match &store {
        Ok(version) => println!("store  ok  {}", version),
        Err(e) => println!("store  FAILED  {:#}", e),
    }

    let cache = check_cache(config).await;
    match &cache {
        Ok(()) => println!("cache  ok  {}", config.cache.url),
        Err(e) => println!("cache  FAILED  {:#}", e),
    }

    if store.is_err() || cache.is_err() {
        return Err(anyhow!("Connectivity check failed"));
    }
    Ok(())
}

async fn check_store(config: &Config) -> Result<String> {
    let pool = Pool::connect(&config.database).await?;
    let version: Result<(String,), _> = sqlx::query_as("SELECT version()")
        .fetch_one(pool.pg())
        .await;
    pool.close().await;
    let (version,) = version.context("SELECT version() failed")?;
    Ok(version)
}

async fn check_cache(config: &Config) -> Result<()> {
    let cache = cache::from_config(&config.cache)?;
    cache.connect().await?;
    cache.ping().await?;
    Ok(())
}
