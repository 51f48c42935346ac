//! Sync job configuration
//!
//! Every value can come from a flag, the environment, or a `.env` file.

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::MAX_PAGE_SIZE;
use crate::scrapers::twitter_rest::TWITTER_API_BASE;
use crate::scrapers::TwitterCredentials;
use crate::storage::sqlite_store::validate_table_name;

/// Everything the job needs besides its source and store
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub app_env: String,
    /// Retention window. Accepted for compatibility, nothing deletes yet.
    pub days_to_keep: u32,
    pub table_name: String,
    pub db_path: PathBuf,
    pub log_level: String,
    pub screen_name: String,
    pub api_base: String,
    pub page_size: u32,
    pub max_pages: usize,
    pub checkpoint_attempts: u32,
    pub checkpoint_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_env: "local".to_string(),
            days_to_keep: 365,
            table_name: "tweets".to_string(),
            db_path: PathBuf::from("timeline_sync.db"),
            log_level: "info".to_string(),
            screen_name: "kamilsindi".to_string(),
            api_base: TWITTER_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            // 17 full pages covers the ~3200 most recent posts the API exposes
            max_pages: 17,
            checkpoint_attempts: 4,
            checkpoint_backoff: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table_name)?;
        if self.screen_name.trim().is_empty() {
            bail!("screen name must not be empty");
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            bail!("page size must be in 1..={}, got {}", MAX_PAGE_SIZE, self.page_size);
        }
        if self.max_pages == 0 {
            bail!("max pages must be at least 1");
        }
        if self.checkpoint_attempts == 0 {
            bail!("checkpoint attempts must be at least 1");
        }
        Ok(())
    }
}

/// Store and job settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Deployment environment name
    #[arg(long, env = "APP_ENV", default_value = "local")]
    pub app_env: String,

    /// Table holding items and the checkpoint
    #[arg(long, env = "STORE_TABLE_NAME", default_value = "tweets")]
    pub table_name: String,

    /// SQLite database file
    #[arg(long, env = "STORE_DB_PATH", default_value = "timeline_sync.db")]
    pub db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Feed settings; credentials are only required by `sync`
#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Account whose timeline is synced
    #[arg(long, env = "TWITTER_SCREEN_NAME", default_value = "kamilsindi")]
    pub screen_name: String,

    #[arg(long, env = "TWITTER_CONSUMER_KEY", default_value = "", hide_env_values = true)]
    pub consumer_key: String,

    #[arg(long, env = "TWITTER_CONSUMER_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub consumer_secret: String,

    #[arg(long, env = "TWITTER_ACCESS_TOKEN", default_value = "", hide_env_values = true)]
    pub access_token: String,

    #[arg(long, env = "TWITTER_ACCESS_TOKEN_SECRET", default_value = "", hide_env_values = true)]
    pub access_token_secret: String,

    #[arg(long, env = "TWITTER_API_BASE", default_value = TWITTER_API_BASE)]
    pub api_base: String,

    /// Retention window in days (not enforced)
    #[arg(long, env = "DAYS_TO_KEEP", default_value_t = 365)]
    pub days_to_keep: u32,

    /// Page limit per run
    #[arg(long, env = "SYNC_MAX_PAGES", default_value_t = 17)]
    pub max_pages: usize,

    /// Linear backoff step while the table is not yet visible
    #[arg(long, env = "CHECKPOINT_RETRY_BACKOFF_SECS", default_value_t = 5)]
    pub checkpoint_backoff_secs: u64,
}

impl FeedArgs {
    pub fn credentials(&self) -> Result<TwitterCredentials> {
        let creds = TwitterCredentials {
            consumer_key: self.consumer_key.clone(),
            consumer_secret: self.consumer_secret.clone(),
            access_token: self.access_token.clone(),
            access_token_secret: self.access_token_secret.clone(),
        };
        let missing = creds.missing_fields();
        if !missing.is_empty() {
            bail!("missing Twitter credentials: {}", missing.join(", "));
        }
        Ok(creds)
    }
}

/// Merge parsed arguments over the defaults.
pub fn build_config(store: &StoreArgs, feed: &FeedArgs) -> Result<SyncConfig> {
    let config = SyncConfig {
        app_env: store.app_env.clone(),
        table_name: store.table_name.clone(),
        db_path: store.db_path.clone(),
        log_level: store.log_level.clone(),
        screen_name: feed.screen_name.clone(),
        api_base: feed.api_base.clone(),
        days_to_keep: feed.days_to_keep,
        max_pages: feed.max_pages,
        checkpoint_backoff: Duration::from_secs(feed.checkpoint_backoff_secs),
        ..SyncConfig::default()
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        feed: FeedArgs,
    }

    #[test]
    fn test_defaults_validate() {
        SyncConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncConfig::default();
        config.page_size = 201;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.max_pages = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.table_name = "tweets;".to_string();
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.screen_name = " ".to_string();
        assert!(config.validate().is_err());

        // Keywords are quoted by the store, so they are accepted
        let mut config = SyncConfig::default();
        config.table_name = "order".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_config_from_flags() {
        let cli = TestCli::try_parse_from([
            "test",
            "--table-name",
            "timeline",
            "--db-path",
            "/tmp/x.db",
            "--screen-name",
            "someone",
            "--max-pages",
            "3",
            "--checkpoint-backoff-secs",
            "0",
        ])
        .unwrap();

        let config = build_config(&cli.store, &cli.feed).unwrap();
        assert_eq!(config.table_name, "timeline");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.screen_name, "someone");
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.checkpoint_backoff, Duration::ZERO);
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_credentials_required() {
        let cli = TestCli::try_parse_from([
            "test",
            "--consumer-key",
            "ck",
            "--consumer-secret",
            "cs",
            "--access-token",
            "at",
        ])
        .unwrap();

        // Only the token secret is missing, unless the environment supplies it
        if std::env::var("TWITTER_ACCESS_TOKEN_SECRET").is_err() {
            let err = cli.feed.credentials().unwrap_err().to_string();
            assert!(err.contains("access_token_secret"));
        }
    }
}
