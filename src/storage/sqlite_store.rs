//! SQLite-backed Item Store
//!
//! One table per timeline:
//! - item rows:       (id, payload)
//! - checkpoint row:  (0, NULL, max_id)

use super::{ItemStore, StoreError};
use crate::models::{Item, CHECKPOINT_KEY};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

pub struct SqliteItemStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteItemStore {
    /// Open (or create) the database file. Does not create the table.
    pub fn open(db_path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let db_path = db_path.as_ref();
        validate_table_name(table)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .context("Failed to apply database pragmas")?;

        info!(path = %db_path.display(), table, "item store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Table name as a quoted identifier, so keywords like `order` work.
    fn ident(&self) -> String {
        format!("\"{}\"", self.table)
    }

    fn classify(&self, err: rusqlite::Error) -> StoreError {
        let msg = err.to_string();
        if msg.contains("no such table") {
            StoreError::TableNotFound(self.table.clone())
        } else if msg.contains("already exists") {
            StoreError::TableAlreadyExists(self.table.clone())
        } else {
            StoreError::Sqlite(err)
        }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

fn key_column(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdOutOfRange(id))
}

impl ItemStore for SqliteItemStore {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn create_table(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "CREATE TABLE {} (
                    id INTEGER PRIMARY KEY,
                    payload TEXT,
                    max_id INTEGER
                )",
                self.ident()
            ),
            [],
        )
        .map_err(|e| self.classify(e))?;
        Ok(())
    }

    fn put_items(&self, items: &[Item]) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }

        // Validate and serialize outside the lock
        let rows = items
            .iter()
            .map(|item| {
                if item.id == CHECKPOINT_KEY {
                    return Err(StoreError::ReservedKey(item.id));
                }
                Ok((key_column(item.id)?, serde_json::to_string(&item.payload)?))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| self.classify(e))?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT OR REPLACE INTO {} (id, payload) VALUES (?1, ?2)",
                    self.ident()
                ))
                .map_err(|e| self.classify(e))?;
            for (id, payload) in &rows {
                stmt.execute(params![id, payload])?;
            }
        }
        tx.commit()?;

        debug!(table = %self.table, count = rows.len(), "items written");
        Ok(rows.len())
    }

    fn get_item(&self, id: u64) -> Result<Option<Item>, StoreError> {
        if id == CHECKPOINT_KEY {
            return Err(StoreError::ReservedKey(id));
        }
        let key = key_column(id)?;

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT payload FROM {} WHERE id = ?1", self.ident()))
            .map_err(|e| self.classify(e))?;

        let payload = match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
            Ok(p) => p,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(self.classify(e)),
        };

        Ok(Some(Item::new(id, serde_json::from_str(&payload)?)))
    }

    fn count_items(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id != ?1", self.ident()),
                params![CHECKPOINT_KEY as i64],
                |row| row.get(0),
            )
            .map_err(|e| self.classify(e))?;
        Ok(count.max(0) as u64)
    }

    fn get_checkpoint(&self) -> Result<Option<u64>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT max_id FROM {} WHERE id = ?1", self.ident()))
            .map_err(|e| self.classify(e))?;

        let result = stmt.query_row(params![CHECKPOINT_KEY as i64], |row| {
            row.get::<_, Option<i64>>(0)
        });

        match result {
            Ok(max_id) => max_id
                .map(|v| u64::try_from(v).map_err(|_| StoreError::CorruptCheckpoint(v)))
                .transpose(),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(self.classify(e)),
        }
    }

    fn put_checkpoint(&self, max_id: u64) -> Result<(), StoreError> {
        let value = key_column(max_id)?;
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, payload, max_id) VALUES (?1, NULL, ?2)",
                self.ident()
            ),
            params![CHECKPOINT_KEY as i64, value],
        )
        .map_err(|e| self.classify(e))?;
        Ok(())
    }
}
