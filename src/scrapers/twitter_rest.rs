//! Twitter REST API Client
//!
//! User-timeline reads over the v1.1 API with OAuth 1.0a user context.
//! Waits out rate limits instead of failing the run.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::twitter_oauth::{OAuthSigner, TwitterCredentials};
use super::TimelineSource;
use crate::models::{Cursor, Item, MAX_PAGE_SIZE};

pub const TWITTER_API_BASE: &str = "https://api.twitter.com/1.1";

/// How long to wait on HTTP 429 before giving up
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub max_retries: u32,
    pub max_wait: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            // Timeline windows reset every 15 minutes
            max_wait: Duration::from_secs(15 * 60 + 5),
        }
    }
}

#[derive(Clone)]
pub struct TwitterClient {
    client: Client,
    base_url: String,
    signer: OAuthSigner,
    rate_limit: RateLimitPolicy,
}

impl TwitterClient {
    pub fn new(creds: TwitterCredentials) -> Result<Self> {
        Self::with_base_url(creds, TWITTER_API_BASE)
    }

    pub fn with_base_url(creds: TwitterCredentials, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build TwitterClient")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer: OAuthSigner::new(creds),
            rate_limit: RateLimitPolicy::default(),
        })
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = policy;
        self
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Signed GET, retrying after the reset time when rate limited.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Response> {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            let auth = self.signer.authorization_header("GET", &url, query)?;
            let resp = self
                .client
                .get(&url)
                .query(query)
                .header(reqwest::header::AUTHORIZATION, auth)
                .send()
                .await
                .with_context(|| format!("GET {} failed", path))?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.rate_limit.max_retries {
                attempt += 1;
                let reset = resp
                    .headers()
                    .get("x-rate-limit-reset")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<i64>().ok());
                let wait = rate_limit_wait(reset, Utc::now().timestamp(), self.rate_limit.max_wait);
                warn!(
                    path,
                    attempt,
                    wait_secs = wait.as_secs(),
                    "rate limited, waiting for window reset"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow!("GET {} {}: {}", path, status, text));
            }

            return Ok(resp);
        }
    }
}

/// Time until the rate-limit window resets, clamped to `[1s, max_wait]`.
pub fn rate_limit_wait(
    reset_epoch_s: Option<i64>,
    now_epoch_s: i64,
    max_wait: Duration,
) -> Duration {
    let secs = reset_epoch_s
        .map(|reset| reset.saturating_sub(now_epoch_s) + 1)
        .unwrap_or(60)
        .max(1) as u64;
    Duration::from_secs(secs).min(max_wait)
}

/// Query parameters for one user-timeline page.
pub fn timeline_query(screen_name: &str, cursor: Cursor, count: u32) -> Vec<(String, String)> {
    let mut qp: Vec<(String, String)> = Vec::with_capacity(6);
    qp.push(("screen_name".to_string(), screen_name.to_string()));
    qp.push(("count".to_string(), count.clamp(1, MAX_PAGE_SIZE).to_string()));
    qp.push(("include_rts".to_string(), "true".to_string()));
    qp.push(("tweet_mode".to_string(), "extended".to_string()));
    let (since_id, max_id) = match cursor {
        Cursor::Backward { max_id } => (None, max_id),
        Cursor::Forward { since_id, max_id } => (Some(since_id), max_id),
    };
    if let Some(since_id) = since_id {
        qp.push(("since_id".to_string(), since_id.to_string()));
    }
    if let Some(max_id) = max_id {
        qp.push(("max_id".to_string(), max_id.to_string()));
    }
    qp
}

/// Turn a timeline response body into items.
pub fn parse_timeline(body: Vec<serde_json::Value>) -> Result<Vec<Item>> {
    body.into_iter()
        .map(|obj| {
            Item::from_api_object(obj)
                .ok_or_else(|| anyhow!("timeline entry without numeric id"))
        })
        .collect()
}

#[async_trait]
impl TimelineSource for TwitterClient {
    async fn verify_credentials(&self) -> Result<String> {
        let qp = vec![("skip_status".to_string(), "true".to_string())];
        let resp = self.get("/account/verify_credentials.json", &qp).await?;

        let account: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse verify_credentials response")?;

        let screen_name = account
            .get("screen_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        debug!(screen_name = %screen_name, "credentials verified");
        Ok(screen_name)
    }

    async fn user_timeline(
        &self,
        screen_name: &str,
        cursor: Cursor,
        count: u32,
    ) -> Result<Vec<Item>> {
        let qp = timeline_query(screen_name, cursor, count);
        let resp = self.get("/statuses/user_timeline.json", &qp).await?;

        let body: Vec<serde_json::Value> = resp
            .json()
            .await
            .context("Failed to parse user_timeline response")?;

        parse_timeline(body)
    }
}
