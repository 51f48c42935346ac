//! Integration tests for the sync job
//!
//! Drives `SyncJob` end to end against a temp SQLite file and an in-memory
//! feed that pages like the user-timeline endpoint: at most `count` posts
//! with `since_id < id <= max_id`, always newest first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::NamedTempFile;

use timeline_sync::scrapers::TimelineSource;
use timeline_sync::storage::{ensure_table, ItemStore, SqliteItemStore};
use timeline_sync::{Cursor, FetchMode, Item, SyncConfig, SyncJob};

struct FakeTimeline {
    posts: Mutex<BTreeMap<u64, Item>>,
    cursors: Mutex<Vec<Cursor>>,
}

impl FakeTimeline {
    fn with_ids(ids: impl IntoIterator<Item = u64>) -> Arc<Self> {
        let timeline = Arc::new(Self {
            posts: Mutex::new(BTreeMap::new()),
            cursors: Mutex::new(Vec::new()),
        });
        timeline.publish(ids);
        timeline
    }

    fn publish(&self, ids: impl IntoIterator<Item = u64>) {
        let mut posts = self.posts.lock();
        for id in ids {
            let payload = json!({
                "id": id,
                "full_text": format!("post {}", id),
                "user": { "screen_name": "tester" },
            });
            posts.insert(id, Item::new(id, payload));
        }
    }

    fn cursors(&self) -> Vec<Cursor> {
        self.cursors.lock().clone()
    }
}

#[async_trait]
impl TimelineSource for FakeTimeline {
    async fn verify_credentials(&self) -> Result<String> {
        Ok("tester".to_string())
    }

    async fn user_timeline(
        &self,
        _screen_name: &str,
        cursor: Cursor,
        count: u32,
    ) -> Result<Vec<Item>> {
        self.cursors.lock().push(cursor);
        let (since_id, max_id) = match cursor {
            Cursor::Backward { max_id } => (0, max_id),
            Cursor::Forward { since_id, max_id } => (since_id, max_id),
        };
        let upper = max_id.unwrap_or(u64::MAX);
        if upper <= since_id {
            return Ok(Vec::new());
        }

        let posts = self.posts.lock();
        Ok(posts
            .range(since_id + 1..=upper)
            .rev()
            .take(count as usize)
            .map(|(_, item)| item.clone())
            .collect())
    }
}

fn config() -> SyncConfig {
    SyncConfig {
        screen_name: "tester".to_string(),
        checkpoint_backoff: Duration::ZERO,
        ..SyncConfig::default()
    }
}

fn open_store(temp: &NamedTempFile) -> Arc<SqliteItemStore> {
    let store = Arc::new(SqliteItemStore::open(temp.path(), "tweets").unwrap());
    ensure_table(store.as_ref()).unwrap();
    store
}

#[tokio::test]
async fn test_full_history_then_incremental() {
    let temp = NamedTempFile::new().unwrap();
    let store = open_store(&temp);
    let feed = FakeTimeline::with_ids(10..260);

    let job = SyncJob::new(config(), feed.clone(), store.clone());

    // First run: no checkpoint, walks history backward (200 + 50)
    let report = job.run().await.unwrap();
    assert_eq!(report.mode, FetchMode::Backward);
    assert_eq!(report.items_stored, 250);
    assert_eq!(report.pages_fetched, 2);
    assert_eq!(store.count_items().unwrap(), 250);
    assert_eq!(store.get_checkpoint().unwrap(), Some(259));

    // New posts arrive
    feed.publish(260..265);

    let report = job.run().await.unwrap();
    assert_eq!(report.mode, FetchMode::Forward);
    assert_eq!(report.previous_checkpoint, Some(259));
    assert_eq!(report.items_stored, 5);
    assert_eq!(store.count_items().unwrap(), 255);
    assert_eq!(store.get_checkpoint().unwrap(), Some(264));

    let newest = store.get_item(264).unwrap().unwrap();
    assert_eq!(newest.payload["full_text"], "post 264");
}

#[tokio::test]
async fn test_nothing_new_is_a_noop() {
    let temp = NamedTempFile::new().unwrap();
    let store = open_store(&temp);
    let feed = FakeTimeline::with_ids(1..=20);

    let job = SyncJob::new(config(), feed.clone(), store.clone());
    job.run().await.unwrap();
    assert_eq!(store.get_checkpoint().unwrap(), Some(20));

    let report = job.run().await.unwrap();
    assert_eq!(report.items_fetched, 0);
    assert_eq!(report.new_checkpoint, None);
    assert_eq!(store.get_checkpoint().unwrap(), Some(20));
    assert_eq!(store.count_items().unwrap(), 20);
}

#[tokio::test]
async fn test_forward_sync_pages_past_one_page() {
    let temp = NamedTempFile::new().unwrap();
    let store = open_store(&temp);
    store.put_checkpoint(1000).unwrap();

    let feed = FakeTimeline::with_ids(1001..=1450);
    let job = SyncJob::new(config(), feed.clone(), store.clone());

    let report = job.run().await.unwrap();
    assert_eq!(report.items_stored, 450);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(store.count_items().unwrap(), 450);
    assert_eq!(store.get_checkpoint().unwrap(), Some(1450));
    assert!(store.get_item(1001).unwrap().is_some());

    // since_id stays on the checkpoint while max_id walks down
    let forward = |max_id| Cursor::Forward {
        since_id: 1000,
        max_id,
    };
    assert_eq!(
        feed.cursors(),
        vec![forward(None), forward(Some(1250)), forward(Some(1050))]
    );
}

#[tokio::test]
async fn test_page_limit_holds_checkpoint_until_gap_is_filled() {
    let temp = NamedTempFile::new().unwrap();
    let store = open_store(&temp);
    store.put_checkpoint(1000).unwrap();
    let feed = FakeTimeline::with_ids(1001..=1450);

    let limited = SyncConfig {
        max_pages: 2,
        ..config()
    };
    let report = SyncJob::new(limited, feed.clone(), store.clone())
        .run()
        .await
        .unwrap();
    assert!(report.truncated);
    assert_eq!(report.items_stored, 400);
    assert!(store.get_item(1050).unwrap().is_none());
    assert_eq!(store.get_checkpoint().unwrap(), Some(1000));

    // The next run walks the whole range again and closes the gap
    let report = SyncJob::new(config(), feed, store.clone())
        .run()
        .await
        .unwrap();
    assert!(!report.truncated);
    assert_eq!(store.count_items().unwrap(), 450);
    assert_eq!(store.get_checkpoint().unwrap(), Some(1450));
}

#[tokio::test]
async fn test_every_item_newer_than_checkpoint_is_stored() {
    let cases: Vec<(u64, Vec<u64>)> = vec![
        (1, vec![2]),
        (1000, (1001..=1005).collect()),
        (50, vec![51, 77, 90, 400]),
        (7, (8..=600).step_by(3).collect()),
        (500, (501..=1100).collect()),
        (3, (4..=2000).step_by(7).collect()),
    ];

    for (checkpoint, ids) in cases {
        let temp = NamedTempFile::new().unwrap();
        let store = open_store(&temp);
        store.put_checkpoint(checkpoint).unwrap();

        let feed = FakeTimeline::with_ids(ids.iter().copied());
        let job = SyncJob::new(config(), feed, store.clone());
        job.run().await.unwrap();

        let expected_max = *ids.iter().max().unwrap();
        assert_eq!(store.count_items().unwrap(), ids.len() as u64);
        assert_eq!(store.get_checkpoint().unwrap(), Some(expected_max));
        for id in &ids {
            assert!(store.get_item(*id).unwrap().is_some(), "missing {}", id);
        }
    }
}

#[tokio::test]
async fn test_store_reopened_keeps_checkpoint() {
    let temp = NamedTempFile::new().unwrap();
    {
        let store = open_store(&temp);
        let job = SyncJob::new(config(), FakeTimeline::with_ids(1..=3), store);
        job.run().await.unwrap();
    }

    // Creating the table again only warns
    let store = open_store(&temp);
    assert_eq!(store.get_checkpoint().unwrap(), Some(3));
    assert_eq!(store.count_items().unwrap(), 3);
}
