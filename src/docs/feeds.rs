use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime};
use tracing::{debug, info, warn};

use super::types::Topic;
use crate::error::{DigestError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const LINK_COLUMN: usize = 2;
const TIMESTAMP_COLUMN: usize = 3;

/// Source of recently published links for a topic.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Links published within the last `hours` hours.
    async fn fetch(&self, topic: &Topic, hours: i64) -> Result<Vec<String>>;
}

/// Reads a topic's CSV feed over HTTP.
pub struct CsvFeedFetcher {
    client: reqwest::Client,
}

impl CsvFeedFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for CsvFeedFetcher {
    async fn fetch(&self, topic: &Topic, hours: i64) -> Result<Vec<String>> {
        let fail = |message: String| DigestError::FetchFailed {
            topic: topic.key.clone(),
            message,
        };

        let cutoff = lookback_cutoff(Local::now().naive_local(), hours)
            .ok_or_else(|| fail(format!("lookback of {} hours is out of range", hours)))?;

        let resp = self
            .client
            .get(&topic.feed_url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {} from {}", status, topic.feed_url)));
        }

        let body = resp.text().await.map_err(|e| fail(e.to_string()))?;
        let links = parse_feed(&body, cutoff);

        info!(topic = %topic.key, links = links.len(), hours, "Feed fetched");
        Ok(links)
    }
}

/// `now` minus `hours`, or `None` when that falls outside the calendar range.
pub fn lookback_cutoff(now: NaiveDateTime, hours: i64) -> Option<NaiveDateTime> {
    Duration::try_hours(hours).and_then(|d| now.checked_sub_signed(d))
}

/// Extract links whose timestamp is at or after `cutoff`.
///
/// The first row is a header. Rows with fewer than four columns or an
/// unparseable timestamp are skipped.
pub fn parse_feed(body: &str, cutoff: NaiveDateTime) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut links = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping malformed feed row: {}", e);
                continue;
            }
        };
        if record.len() <= TIMESTAMP_COLUMN {
            continue;
        }

        let raw_ts = record[TIMESTAMP_COLUMN].trim();
        let Ok(published) = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT) else {
            warn!(timestamp = raw_ts, "Skipping feed row with bad timestamp");
            continue;
        };

        if published >= cutoff {
            links.push(record[LINK_COLUMN].trim().to_string());
        }
    }

    debug!(count = links.len(), %cutoff, "Feed rows within window");
    links
}
