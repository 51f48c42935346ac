//! Timeline Sync CLI
//!
//! Usage:
//!   timeline-sync                 # same as `sync`
//!   timeline-sync sync            # create table if needed, fetch, store, checkpoint
//!   timeline-sync init-table
//!   timeline-sync checkpoint      # print stored high-water mark and item count
//!
//! Every flag falls back to an environment variable; a `.env` file is loaded first.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;

use timeline_sync::config::{build_config, FeedArgs, StoreArgs};
use timeline_sync::logging::init_tracing;
use timeline_sync::scrapers::TwitterClient;
use timeline_sync::storage::{ensure_table, ItemStore, SqliteItemStore};
use timeline_sync::SyncJob;

#[derive(Parser, Debug)]
#[command(name = "timeline-sync")]
#[command(about = "Incremental sync of a Twitter timeline into a SQLite key-value table")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    feed: FeedArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Fetch posts newer than the checkpoint and store them (default)
    Sync,
    /// Create the table; an existing table only logs a warning
    InitTable,
    /// Print the stored checkpoint and item count as JSON
    Checkpoint,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.store.log_level);

    let config = build_config(&cli.store, &cli.feed)?;
    info!(
        env = %config.app_env,
        table = %config.table_name,
        db = %config.db_path.display(),
        "timeline-sync starting"
    );

    let store = Arc::new(SqliteItemStore::open(&config.db_path, &config.table_name)?);

    match cli.command.unwrap_or(Command::Sync) {
        Command::InitTable => {
            ensure_table(store.as_ref())?;
        }
        Command::Checkpoint => {
            let checkpoint = store.get_checkpoint().context("Failed to read checkpoint")?;
            let items = store.count_items().context("Failed to count items")?;
            println!(
                "{}",
                serde_json::json!({
                    "table": config.table_name,
                    "max_id": checkpoint,
                    "items": items,
                })
            );
        }
        Command::Sync => {
            let creds = cli.feed.credentials()?;
            let source = Arc::new(TwitterClient::with_base_url(creds, &config.api_base)?);

            ensure_table(store.as_ref())?;

            let job = SyncJob::new(config, source, store);
            let report = job.run().await?;

            info!(
                mode = report.mode.as_str(),
                stored = report.items_stored,
                max_id = ?report.new_checkpoint,
                truncated = report.truncated,
                "sync complete"
            );
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    Ok(())
}
