//! contentctl CLI - content items in Postgres behind a Redis cache
//!
//! - `migrate`: apply pending schema scripts, or show what is applied
//! - `check`: verify the store and cache are reachable
//! - `items`: list, read and edit content items through the cache
//! - `cache`: maintenance on cached keys

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use contentctl_store::config::load_dotenv;
use contentctl_store::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "contentctl",
    author,
    version,
    about = "Content items in Postgres with a read-through Redis cache",
    long_about = "Run schema migrations, check connectivity and manage content items. \
                  Reads are served from the cache when possible; writes invalidate it."
)]
struct Cli {
    /// Config file (default: ~/.contentctl/config.toml, then ./contentctl.toml)
    #[arg(long, global = true, env = "CONTENTCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations (or list them with --status)
    Migrate(commands::migrate::MigrateArgs),
    /// Check store and cache connectivity
    Check,
    /// Read and edit content items
    Items(commands::items::ItemsArgs),
    /// Cache maintenance
    Cache(commands::cache::CacheArgs),
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().ok();
    load_dotenv();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Migrate(args) => commands::run_migrate(args, &config).await?,
        Commands::Check => commands::run_check(&config).await?,
        Commands::Items(args) => commands::run_items(args, &config).await?,
        Commands::Cache(args) => commands::run_cache(args, &config).await?,
    }

    Ok(())
}
