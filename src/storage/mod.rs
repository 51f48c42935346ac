//! Item Store
//!
//! Key-value persistence for fetched items and the sync high-water mark.
//! Items live at their own id; the checkpoint lives at the reserved key 0.

pub mod sqlite_store;

pub use sqlite_store::SqliteItemStore;

use crate::models::Item;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),
    #[error("id {0} is reserved for the checkpoint")]
    ReservedKey(u64),
    #[error("id {0} does not fit the key column")]
    IdOutOfRange(u64),
    #[error("checkpoint holds a negative id: {0}")]
    CorruptCheckpoint(i64),
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub trait ItemStore: Send + Sync {
    fn table_name(&self) -> &str;

    /// Create the backing table. Fails with `TableAlreadyExists` if present.
    fn create_table(&self) -> Result<(), StoreError>;

    /// Write items keyed by id, overwriting existing rows. Returns rows written.
    fn put_items(&self, items: &[Item]) -> Result<usize, StoreError>;

    fn get_item(&self, id: u64) -> Result<Option<Item>, StoreError>;

    /// Number of stored items, excluding the checkpoint row.
    fn count_items(&self) -> Result<u64, StoreError>;

    fn get_checkpoint(&self) -> Result<Option<u64>, StoreError>;

    fn put_checkpoint(&self, max_id: u64) -> Result<(), StoreError>;
}

/// Create the table, treating "already exists" as a warning.
pub fn ensure_table(store: &dyn ItemStore) -> Result<(), StoreError> {
    info!(table = store.table_name(), "creating table");
    match store.create_table() {
        Ok(()) => {
            info!(table = store.table_name(), "table created");
            Ok(())
        }
        Err(StoreError::TableAlreadyExists(table)) => {
            warn!(table = %table, "table already exists");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
