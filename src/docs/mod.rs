pub mod feeds;
pub mod ingest;
pub mod types;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{DigestError, Result};
use ingest::Extractor;
use types::Topic;

const FEED_BASE: &str = "https://seit.egr.msu.edu/data";

/// The fixed topic set, in digest order.
pub fn default_topics() -> Vec<Topic> {
    [
        ("security", "Security"),
        ("ai", "AI"),
        ("iot", "IoT"),
        ("blockchain", "Blockchain"),
    ]
    .into_iter()
    .map(|(key, title)| Topic::new(key, title, &format!("{}/{}_title_url.csv", FEED_BASE, key)))
    .collect()
}

pub fn find_topic<'a>(topics: &'a [Topic], key: &str) -> Option<&'a Topic> {
    topics.iter().find(|t| t.key.eq_ignore_ascii_case(key))
}

/// On-disk record of one extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedExtraction {
    url: String,
    text: String,
    extracted_at: i64,
}

fn cache_key(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex().to_string()
}

/// Extraction cache: one JSON file per URL, plus an in-memory layer.
///
/// Entries older than `ttl_hours` are treated as missing.
pub struct ExtractCache {
    dir: PathBuf,
    ttl_hours: i64,
    memory: RwLock<HashMap<String, CachedExtraction>>,
}

impl ExtractCache {
    pub fn new(dir: &Path, ttl_hours: i64) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| DigestError::Cache(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ttl_hours,
            memory: RwLock::new(HashMap::new()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn is_fresh(&self, entry: &CachedExtraction) -> bool {
        let age = chrono::Utc::now().timestamp() - entry.extracted_at;
        age <= self.ttl_hours * 3600
    }

    pub async fn get(&self, url: &str) -> Option<String> {
        let key = cache_key(url);

        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(&key) {
                if self.is_fresh(entry) {
                    return Some(entry.text.clone());
                }
            }
        }

        let bytes = tokio::fs::read(self.path_for(&key)).await.ok()?;
        let entry: CachedExtraction = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(url, "Ignoring unreadable cache entry: {}", e);
                return None;
            }
        };
        if entry.url != url || !self.is_fresh(&entry) {
            return None;
        }

        let text = entry.text.clone();
        self.memory.write().await.insert(key, entry);
        Some(text)
    }

    pub async fn put(&self, url: &str, text: &str) -> Result<()> {
        let key = cache_key(url);
        let entry = CachedExtraction {
            url: url.to_string(),
            text: text.to_string(),
            extracted_at: chrono::Utc::now().timestamp(),
        };

        let bytes = serde_json::to_vec(&entry).map_err(|e| DigestError::Cache(e.to_string()))?;
        tokio::fs::write(self.path_for(&key), bytes)
            .await
            .map_err(|e| DigestError::Cache(e.to_string()))?;

        self.memory.write().await.insert(key.clone(), entry);
        debug!(url, key = %key, "Extraction cached");
        Ok(())
    }
}

/// Wraps an extractor with the extraction cache.
pub struct CachedExtractor {
    inner: Arc<dyn Extractor>,
    cache: ExtractCache,
}

impl CachedExtractor {
    pub fn new(inner: Arc<dyn Extractor>, cache: ExtractCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl Extractor for CachedExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        if let Some(text) = self.cache.get(url).await {
            debug!(url, "Extraction cache hit");
            return Ok(text);
        }

        let text = self.inner.extract(url).await?;
        if let Err(e) = self.cache.put(url, &text).await {
            warn!(url, "Failed to cache extraction: {}", e);
        }
        Ok(text)
    }
}
