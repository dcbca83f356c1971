//! Content item commands
//!
//! Commands: list, get, create, update, delete. Output is JSON on stdout.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use contentctl_store::{start, Config};
use serde_json::json;

#[derive(Parser, Debug)]
pub struct ItemsArgs {
    #[command(subcommand)]
    pub command: ItemsCommands,
}

#[derive(Subcommand, Debug)]
pub enum ItemsCommands {
    /// List all items, newest first
    List,
    /// Show one item
    Get {
        /// Item ID
        id: i64,
    },
    /// Create an item
    Create(ItemFieldsArgs),
    /// Replace an item's title and body
    Update {
        /// Item ID
        id: i64,
        #[command(flatten)]
        fields: ItemFieldsArgs,
    },
    /// Delete an item
    Delete {
        /// Item ID
        id: i64,
    },
}

#[derive(Parser, Debug)]
pub struct ItemFieldsArgs {
    /// Item title (must not be empty)
    #[arg(long)]
    pub title: String,

    /// Item body (must not be empty)
    #[arg(long)]
    pub body: String,
}

pub async fn run_items(args: ItemsArgs, config: &Config) -> Result<()> {
    let services = start(config).await?;
    let result = dispatch(args.command, &services.repository).await;
    services.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn dispatch(
    command: ItemsCommands,
    repo: &contentctl_store::ContentRepository,
) -> Result<serde_json::Value> {
    let value = match command {
        ItemsCommands::List => serde_json::to_value(repo.get_all().await?)?,
        ItemsCommands::Get { id } => {
            let item = repo
                .get_by_id(id)
                .await?
                .ok_or_else(|| anyhow!("Item {} not found", id))?;
            serde_json::to_value(item)?
        }
        ItemsCommands::Create(fields) => {
            serde_json::to_value(repo.create(&fields.title, &fields.body).await?)?
        }
        ItemsCommands::Update { id, fields } => {
            let item = repo
                .update(id, &fields.title, &fields.body)
                .await?
                .ok_or_else(|| anyhow!("Item {} not found", id))?;
            serde_json::to_value(item)?
        }
        ItemsCommands::Delete { id } => {
            let deleted = repo.delete(id).await?;
            json!({ "id": id, "deleted": deleted })
        }
    };
    Ok(value)
}
