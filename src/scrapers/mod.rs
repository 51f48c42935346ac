pub mod twitter_oauth; // OAuth 1.0a request signing
pub mod twitter_rest; // REST client for user timelines

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Cursor, Item};

pub use twitter_oauth::TwitterCredentials;
pub use twitter_rest::{RateLimitPolicy, TwitterClient};

/// A paginated feed of one account's posts
#[async_trait]
pub trait TimelineSource: Send + Sync {
    /// Check the credentials; returns the authenticated account name.
    async fn verify_credentials(&self) -> Result<String>;

    /// One page of at most `count` posts inside the cursor's id range, newest
    /// first.
    async fn user_timeline(
        &self,
        screen_name: &str,
        cursor: Cursor,
        count: u32,
    ) -> Result<Vec<Item>>;
}
