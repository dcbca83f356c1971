//! Cache maintenance
//!
//! Commands: clear

use anyhow::Result;
use clap::{Parser, Subcommand};
use contentctl_store::cache::{self, Cache};
use contentctl_store::repository::CacheKeys;
use contentctl_store::Config;

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Delete cached keys (default: every item key)
    Clear(ClearArgs),
}

#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Glob pattern of keys to delete, e.g. 'items:4*'
    #[arg(long)]
    pub pattern: Option<String>,
}

pub async fn run_cache(args: CacheArgs, config: &Config) -> Result<()> {
    match args.command {
        CacheCommands::Clear(clear) => run_clear(clear, config).await,
    }
}

async fn run_clear(args: ClearArgs, config: &Config) -> Result<()> {
    let handle = cache::from_config(&config.cache)?;
    handle.connect().await?;

    let pattern = args
        .pattern
        .unwrap_or_else(|| CacheKeys::new(config.cache.key_prefix.clone()).pattern());
    let removed = handle.as_cache().delete_matching(&pattern).await;
    println!("removed {} key(s) matching {}", removed, pattern);
    Ok(())
}
