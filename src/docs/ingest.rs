use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{DigestError, Result};

/// Turns an article URL into readable text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<String>;
}

/// Response body of the remote markdown conversion service.
#[derive(Debug, Deserialize)]
struct MarkdownResponse {
    article: Option<String>,
}

/// Fetches pages over HTTP and converts HTML to text.
///
/// When `api_url` is set the URL is handed to a remote markdown conversion
/// service instead of being fetched directly.
pub struct WebExtractor {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl WebExtractor {
    pub fn new(client: reqwest::Client, api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    async fn extract_remote(&self, api_url: &str, url: &str) -> Result<String> {
        let mut req = self
            .client
            .post(api_url)
            .json(&serde_json::json!({ "url": url }));
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }

        let resp = req.send().await.map_err(|e| fail(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(url, format!("conversion service returned HTTP {}", status)));
        }

        let body: MarkdownResponse = resp.json().await.map_err(|e| fail(url, e))?;
        Ok(body.article.unwrap_or_default())
    }

    async fn extract_direct(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await.map_err(|e| fail(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(url, format!("HTTP {}", status)));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp.bytes().await.map_err(|e| fail(url, e))?;
        Ok(body_to_text(&body, &content_type))
    }
}

#[async_trait]
impl Extractor for WebExtractor {
    async fn extract(&self, url: &str) -> Result<String> {
        let text = match &self.api_url {
            Some(api_url) => self.extract_remote(api_url, url).await?,
            None => self.extract_direct(url).await?,
        };

        if text.trim().is_empty() {
            return Err(fail(url, "no readable text"));
        }

        info!(url, size = text.len(), "Article extracted");
        Ok(text)
    }
}

/// Convert a response body to text, rendering HTML when the content type says so.
pub fn body_to_text(body: &[u8], content_type: &str) -> String {
    if content_type.contains("html") {
        html2text::from_read(body, 120).unwrap_or_else(|e| {
            debug!("html2text failed, falling back to raw body: {}", e);
            String::from_utf8_lossy(body).to_string()
        })
    } else {
        String::from_utf8_lossy(body).to_string()
    }
}

fn fail(url: &str, err: impl ToString) -> DigestError {
    DigestError::ExtractionFailed {
        url: url.to_string(),
        message: err.to_string(),
    }
}
