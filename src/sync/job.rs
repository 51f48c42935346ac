//! Incremental Timeline Sync
//!
//! load checkpoint → authenticate → page through the feed → store items →
//! advance the checkpoint. A run that fetches nothing writes nothing.

use anyhow::{ensure, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::models::{Cursor, FetchMode, Item, RunReport, Step};
use crate::scrapers::TimelineSource;
use crate::storage::{ItemStore, StoreError};

pub struct SyncJob {
    config: SyncConfig,
    source: Arc<dyn TimelineSource>,
    store: Arc<dyn ItemStore>,
}

/// Items from one walk over the feed
struct Fetched {
    items: Vec<Item>,
    pages: usize,
    /// The walk stopped on the page limit with more posts left in range.
    truncated: bool,
}

impl SyncJob {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn TimelineSource>,
        store: Arc<dyn ItemStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
        }
    }

    /// Read the high-water mark. A missing table is retried with linear
    /// backoff since a freshly created one may not be visible yet.
    pub async fn load_checkpoint(&self) -> Result<Option<u64>> {
        let attempts = self.config.checkpoint_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.store.get_checkpoint() {
                Ok(max_id) => {
                    debug!(?max_id, attempt, "checkpoint read");
                    return Ok(max_id);
                }
                Err(StoreError::TableNotFound(table)) if attempt < attempts => {
                    let sleep = self.config.checkpoint_backoff * attempt;
                    info!(
                        table = %table,
                        attempt,
                        remaining = attempts - attempt,
                        sleep_secs = sleep.as_secs_f64(),
                        "table not found, retrying"
                    );
                    tokio::time::sleep(sleep).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read checkpoint after {} attempt(s)", attempt)
                    });
                }
            }
        }
    }

    pub fn save_checkpoint(&self, max_id: u64) -> Result<()> {
        self.store
            .put_checkpoint(max_id)
            .with_context(|| format!("Failed to store checkpoint {}", max_id))
    }

    /// Write items keyed by id and return the largest id written.
    pub fn store(&self, items: &[Item]) -> Result<u64> {
        ensure!(!items.is_empty(), "items must not be empty");

        let max_id = items.iter().map(|i| i.id).max().unwrap_or_default();
        let written = self
            .store
            .put_items(items)
            .with_context(|| format!("Failed to write {} items", items.len()))?;

        debug!(written, max_id, "items stored");
        Ok(max_id)
    }

    /// Everything after `checkpoint` in increasing id order, or the full
    /// reachable history newest first without one.
    pub async fn fetch(&self, checkpoint: Option<u64>) -> Result<Vec<Item>> {
        Ok(self.fetch_pages(checkpoint).await?.items)
    }

    async fn fetch_pages(&self, checkpoint: Option<u64>) -> Result<Fetched> {
        let mut cursor = Cursor::from_checkpoint(checkpoint);
        let mut items: Vec<Item> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut pages = 0usize;
        let mut truncated = false;

        loop {
            if pages == self.config.max_pages {
                info!(
                    max_pages = self.config.max_pages,
                    ?cursor,
                    "page limit reached"
                );
                truncated = true;
                break;
            }

            let page = self
                .source
                .user_timeline(&self.config.screen_name, cursor, self.config.page_size)
                .await
                .with_context(|| format!("Failed to fetch timeline page {}", pages + 1))?;

            if page.is_empty() {
                break;
            }
            pages += 1;

            let step = cursor.advance(&page);
            let before = items.len();
            for item in page {
                if checkpoint.is_some_and(|c| item.id <= c) || !seen.insert(item.id) {
                    continue;
                }
                items.push(item);
            }

            info!(
                mode = cursor.mode().as_str(),
                page = pages,
                new = items.len() - before,
                total = items.len(),
                "items downloaded so far"
            );

            match step {
                Step::Next(c) => cursor = c,
                Step::Done => break,
                Step::Stalled => {
                    warn!(?cursor, "page did not advance the cursor, stopping");
                    break;
                }
            }
        }

        if cursor.mode() == FetchMode::Forward {
            items.sort_unstable_by_key(|i| i.id);
        }

        Ok(Fetched {
            items,
            pages,
            truncated,
        })
    }

    pub async fn run(&self) -> Result<RunReport> {
        let previous = self.load_checkpoint().await?;
        info!(max_id = ?previous, "found max id");

        let mode = Cursor::from_checkpoint(previous).mode();

        let account = match self.source.verify_credentials().await {
            Ok(account) => account,
            Err(e) => {
                error!(error = %e, "please check the authentication information");
                return Err(e.context("Authentication failed"));
            }
        };
        debug!(account = %account, "authenticated");

        let Fetched {
            items,
            pages,
            truncated,
        } = self.fetch_pages(previous).await?;
        info!(count = items.len(), pages, truncated, "items found");

        let mut report = RunReport {
            mode,
            pages_fetched: pages,
            items_fetched: items.len(),
            items_stored: 0,
            previous_checkpoint: previous,
            new_checkpoint: None,
            truncated: false,
        };

        if items.is_empty() {
            return Ok(report);
        }

        let max_id = self.store(&items)?;
        report.items_stored = items.len();

        // Posts between the checkpoint and the oldest one fetched are still
        // missing, so the checkpoint must stay below them.
        if truncated && mode == FetchMode::Forward {
            warn!(
                max_id = ?previous,
                stored = items.len(),
                "page limit hit before reaching the checkpoint, keeping it"
            );
            report.truncated = true;
            return Ok(report);
        }

        let new_max_id = previous.map_or(max_id, |p| p.max(max_id));
        info!(max_id = new_max_id, "updating max_id");
        self.save_checkpoint(new_max_id)?;
        report.new_checkpoint = Some(new_max_id);

        Ok(report)
    }
}
