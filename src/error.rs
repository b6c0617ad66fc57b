use thiserror::Error;

/// Failures the digest pipeline distinguishes.
///
/// `FetchFailed` and `ExtractionFailed` are degraded by the caller (empty topic,
/// dropped URL). `SummarizationFailed` and `BudgetExceeded` abort the topic
/// they occur in.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to fetch feed for topic '{topic}': {message}")]
    FetchFailed { topic: String, message: String },

    #[error("failed to extract {url}: {message}")]
    ExtractionFailed { url: String, message: String },

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("input of {tokens} tokens exceeds budget of {budget} and cannot be split further")]
    BudgetExceeded { tokens: usize, budget: usize },

    #[error("cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, DigestError>;
