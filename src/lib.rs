//! Timeline Sync Library
//!
//! Incremental sync of one account's timeline into a key-value table,
//! keyed by post id with a high-water-mark checkpoint.

pub mod config;
pub mod logging;
pub mod models;
pub mod scrapers;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use models::{Cursor, FetchMode, Item, RunReport, Step};
pub use sync::SyncJob;
