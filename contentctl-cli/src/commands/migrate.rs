//! Schema migrations
//!
//! Commands: migrate, migrate --status

use anyhow::{Context, Result};
use clap::Parser;
use contentctl_store::db::Pool;
use contentctl_store::migrations::MigrationRunner;
use contentctl_store::Config;
use tracing::info;

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Show applied and pending scripts without running anything
    #[arg(long)]
    pub status: bool,
}

pub async fn run_migrate(args: MigrateArgs, config: &Config) -> Result<()> {
    let pool = Pool::connect(&config.database)
        .await
        .context("Failed to connect to the store")?;
    let runner = MigrationRunner::from_config(pool.clone(), &config.migrations)?;

    let result = if args.status {
        print_status(&runner).await
    } else {
        apply(&runner).await
    };

    pool.close().await;
    result
}

async fn apply(runner: &MigrationRunner) -> Result<()> {
    let report = runner.run().await?;
    for name in &report.applied {
        println!("applied  {}", name);
    }
    if report.applied.is_empty() {
        info!("Schema is up to date ({} scripts)", report.skipped.len());
    }
    Ok(())
}

async fn print_status(runner: &MigrationRunner) -> Result<()> {
    let status = runner.status().await?;
    for applied in &status.applied {
        println!(
            "applied  {}  {}",
            applied.name,
            applied.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    for name in &status.pending {
        println!("pending  {}", name);
    }
    Ok(())
}
