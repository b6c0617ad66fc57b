use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::digest::prompts;
use crate::digest::DigestEngine;
use crate::docs::default_topics;
use crate::docs::types::Topic;

/// Token budget and prompts for one chunked reducer.
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    pub map_prompt: String,
    pub combine_prompt: String,
    /// Inputs at or under this many tokens are summarized in a single call.
    pub token_max: usize,
    /// Target size when an oversized input has to be split.
    pub chunk_tokens: usize,
}

impl ReduceConfig {
    /// Per-document reduction: plain concise summaries.
    pub fn for_documents(token_max: usize, chunk_tokens: usize) -> Self {
        Self {
            map_prompt: prompts::DOCUMENT_PROMPT.to_string(),
            combine_prompt: prompts::DOCUMENT_PROMPT.to_string(),
            token_max,
            chunk_tokens,
        }
    }

    /// Topic and final reduction: cited, audience-tailored summaries.
    pub fn for_topics(token_max: usize, chunk_tokens: usize, brief: &str) -> Self {
        Self {
            map_prompt: prompts::TOPIC_MAP_PROMPT.to_string(),
            combine_prompt: prompts::topic_combine_prompt(brief),
            token_max,
            chunk_tokens,
        }
    }
}

/// Digest run parameters.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub lookback_hours: i64,
    pub token_max: usize,
    pub chunk_tokens: usize,
    pub cache_dir: PathBuf,
    pub cache_ttl_hours: i64,
    pub extract_api_url: Option<String>,
    pub extract_api_key: Option<String>,
    pub audience_brief: String,
    pub topics: Vec<Topic>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            token_max: 14_000,
            chunk_tokens: 1_000,
            cache_dir: PathBuf::from("./data/cache"),
            cache_ttl_hours: 24,
            extract_api_url: None,
            extract_api_key: None,
            audience_brief: prompts::AUDIENCE_BRIEF.to_string(),
            topics: default_topics(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    dotenv::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl DigestConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let audience_brief = match dotenv::var("DIGEST_BRIEF_FILE").ok() {
            Some(path) => std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read audience brief from {}", path))?,
            None => defaults.audience_brief,
        };

        Ok(Self {
            lookback_hours: env_parse("DIGEST_LOOKBACK_HOURS").unwrap_or(defaults.lookback_hours),
            token_max: env_parse("DIGEST_TOKEN_MAX").unwrap_or(defaults.token_max),
            chunk_tokens: env_parse("DIGEST_CHUNK_TOKENS").unwrap_or(defaults.chunk_tokens),
            cache_dir: dotenv::var("DIGEST_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl_hours: env_parse("DIGEST_CACHE_TTL_HOURS")
                .unwrap_or(defaults.cache_ttl_hours),
            extract_api_url: dotenv::var("EXTRACT_API_URL").ok().filter(|s| !s.is_empty()),
            extract_api_key: dotenv::var("EXTRACT_API_KEY").ok().filter(|s| !s.is_empty()),
            audience_brief,
            topics: defaults.topics,
        })
    }

    pub fn document_reduce(&self) -> ReduceConfig {
        ReduceConfig::for_documents(self.token_max, self.chunk_tokens)
    }

    pub fn topic_reduce(&self) -> ReduceConfig {
        ReduceConfig::for_topics(self.token_max, self.chunk_tokens, &self.audience_brief)
    }
}

pub struct AppState {
    pub config: DigestConfig,
    pub engine: DigestEngine,
}
