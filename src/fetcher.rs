// src/fetcher.rs

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::feed::{decode_table, FeedKind, FeedTable};
use crate::session::FeedSession;

/// Retrieves the raw tables for a ticker.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, kind: FeedKind, ticker: &str) -> Result<FeedTable, FeedError>;
}

/// Fetches both feeds over HTTP GET through the shared [`FeedSession`].
pub struct HttpFeedSource {
    config: FeedConfig,
}

impl HttpFeedSource {
    pub fn new(config: FeedConfig) -> Self {
        HttpFeedSource { config }
    }

    pub fn url_for(&self, kind: FeedKind, ticker: &str) -> String {
        let template = match kind {
            FeedKind::Ticks => &self.config.ticks_url,
            FeedKind::Predictions => &self.config.predictions_url,
        };
        template.replace("{ticker}", ticker)
    }

    async fn fetch_once(&self, url: &str) -> Result<FeedTable, FeedError> {
        let response = FeedSession::send_request(url, self.config.api_key.as_deref(), self.config.timeout()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let body = response.text().await?;
        decode_table(&body)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, kind: FeedKind, ticker: &str) -> Result<FeedTable, FeedError> {
        let url = self.url_for(kind, ticker);
        let mut retry_count = 0;

        loop {
            match self.fetch_once(&url).await {
                Ok(table) => {
                    debug!(%kind, ticker, rows = table.len(), "feed fetched");
                    return Ok(table);
                }
                Err(error) if error.should_retry() && retry_count < self.config.max_retries => {
                    retry_count += 1;
                    let backoff_duration = Duration::from_secs(2u64.pow(retry_count));
                    warn!(%kind, ticker, %error, retry = retry_count, ?backoff_duration, "feed request failed, retrying");
                    sleep(backoff_duration).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
