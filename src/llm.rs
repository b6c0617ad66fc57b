use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tiktoken_rs::{get_bpe_from_model, CoreBPE};
use tracing::{debug, info, warn};

use crate::error::{DigestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// The opaque text-summarization function.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Counts tokens the way the summarization model would.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

/// ~4 characters per token, rounded up. Close enough to BPE tokenizers on
/// English prose to drive the stuff/map-reduce decision.
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Exact counts from the model's BPE vocabulary.
pub struct BpeTokenCounter {
    bpe: CoreBPE,
}

impl BpeTokenCounter {
    /// `None` when tiktoken has no encoding for `model`.
    pub fn for_model(model: &str) -> Option<Self> {
        let lower = model.to_ascii_lowercase();
        get_bpe_from_model(&lower).ok().map(|bpe| Self { bpe })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

/// Token counter for the configured model, falling back to the heuristic
/// for models tiktoken does not know (local or non-OpenAI endpoints).
pub fn token_counter_for(model: &str) -> Arc<dyn TokenCounter> {
    match BpeTokenCounter::for_model(model) {
        Some(counter) => {
            info!(model, "Using BPE token counter");
            Arc::new(counter)
        }
        None => {
            warn!(model, "No tokenizer for model, estimating ~4 chars per token");
            Arc::new(HeuristicTokenCounter)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl LlmSettings {
    pub fn from_env() -> Self {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = dotenv::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let api_key = dotenv::var("LLM_API_KEY")
            .or_else(|_| dotenv::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());
        let timeout_secs = dotenv::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);
        let max_tokens = dotenv::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1024);

        Self {
            base_url,
            model,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            max_tokens,
        }
    }
}

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| DigestError::SummarizationFailed(format!("HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": messages,
            "temperature": 0.3,
            "max_tokens": self.settings.max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DigestError::SummarizationFailed(format!("request failed: {}", e)))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DigestError::SummarizationFailed(format!("reading response: {}", e)))?;
        if !status.is_success() {
            return Err(DigestError::SummarizationFailed(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(300).collect::<String>()
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| DigestError::SummarizationFailed(format!("bad JSON: {}", e)))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| {
                DigestError::SummarizationFailed("response has no message content".to_string())
            })?
            .to_string();

        Ok(content)
    }
}

#[async_trait]
impl Summarizer for LlmClient {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        // The request already carries the client timeout; this bounds the whole
        // exchange including the body read.
        let guard = self.settings.timeout + Duration::from_secs(5);
        let summary = tokio::time::timeout(guard, self.chat(&messages))
            .await
            .map_err(|_| {
                DigestError::SummarizationFailed(format!("timed out after {:?}", guard))
            })??;

        debug!(
            prompt_len = prompt.len(),
            summary_len = summary.len(),
            "Summarization call complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_timeout(base_url: &str, timeout: Duration) -> LlmClient {
        LlmClient::new(LlmSettings {
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            api_key: None,
            timeout,
            max_tokens: 256,
        })
        .unwrap()
    }

    fn client_with_base(base_url: &str) -> LlmClient {
        client_with_timeout(base_url, Duration::from_secs(5))
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client_with_base("https://api.openai.com/v1").endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            client_with_base("http://localhost:1234/").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client_with_base("http://proxy/v1/chat/completions").endpoint(),
            "http://proxy/v1/chat/completions"
        );
    }

    #[test]
    fn test_heuristic_counter_rounds_up() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("test"), 1);
        assert_eq!(counter.count_tokens("hello"), 2);
        assert_eq!(counter.count_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn test_closure_counter() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.count_tokens("three small words"), 3);
    }

    #[test]
    fn test_bpe_counter_for_known_model() {
        let counter = BpeTokenCounter::for_model("GPT-3.5-Turbo").unwrap();
        assert_eq!(counter.count_tokens("hello world"), 2);
        assert_eq!(counter.count_tokens(""), 0);
        assert!(token_counter_for("gpt-4o").count_tokens("hello world") > 0);
    }

    #[test]
    fn test_unknown_model_falls_back_to_heuristic() {
        assert!(BpeTokenCounter::for_model("llama-local-q4").is_none());
        let counter = token_counter_for("llama-local-q4");
        assert_eq!(counter.count_tokens(&"a".repeat(100)), 25);
    }

    #[tokio::test]
    async fn test_stalled_endpoint_times_out_as_summarization_failure() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = client_with_timeout(
            &format!("http://{}/v1", addr),
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        let err = client.summarize("Summarize this.").await.unwrap_err();

        assert!(matches!(err, DigestError::SummarizationFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        server.abort();
    }
}
