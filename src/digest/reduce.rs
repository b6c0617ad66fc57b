use std::sync::Arc;

use tracing::{debug, info, warn};

use super::citations::marker;
use super::prompts::{self, DOC_SEPARATOR};
use crate::docs::types::{Summary, TaggedDocument};
use crate::error::{DigestError, Result};
use crate::llm::{Summarizer, TokenCounter};
use crate::state::ReduceConfig;

/// Separators tried, coarsest first, when splitting an oversized input.
const SPLIT_SEPARATORS: &[&str] = &["\n\n", "\n", " "];

/// One input to a reduction. `text` already ends with the `[tag]` marker
/// when `tag` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceInput {
    pub text: String,
    pub tag: Option<String>,
}

impl ReduceInput {
    pub fn untagged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tag: None,
        }
    }
}

impl From<&TaggedDocument> for ReduceInput {
    fn from(doc: &TaggedDocument) -> Self {
        Self {
            text: doc.text.clone(),
            tag: Some(doc.tag.clone()),
        }
    }
}

impl From<&Summary> for ReduceInput {
    fn from(summary: &Summary) -> Self {
        Self {
            text: summary.text.clone(),
            tag: summary.tag.clone(),
        }
    }
}

/// Summarizes one or many texts under a token budget.
///
/// Inputs that fit within `token_max` go out in a single combine call.
/// Larger inputs are split where needed, packed into groups that fit, mapped
/// group by group, then collapsed until the partial summaries fit and
/// combined once more.
pub struct ChunkedReducer {
    config: ReduceConfig,
    llm: Arc<dyn Summarizer>,
    counter: Arc<dyn TokenCounter>,
}

impl ChunkedReducer {
    pub fn new(
        mut config: ReduceConfig,
        llm: Arc<dyn Summarizer>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let max_chunk = (config.token_max / 2).max(1);
        if config.chunk_tokens == 0 || config.chunk_tokens > max_chunk {
            warn!(
                chunk_tokens = config.chunk_tokens,
                token_max = config.token_max,
                "Chunk size out of range, clamping to half the budget"
            );
            config.chunk_tokens = max_chunk;
        }
        Self {
            config,
            llm,
            counter,
        }
    }

    fn count(&self, text: &str) -> usize {
        self.counter.count_tokens(text)
    }

    fn joined_tokens(&self, texts: &[String]) -> usize {
        self.count(&texts.join(DOC_SEPARATOR))
    }

    pub async fn reduce(&self, inputs: &[ReduceInput]) -> Result<String> {
        let texts: Vec<String> = inputs.iter().map(|i| i.text.clone()).collect();
        let total = self.joined_tokens(&texts);

        if total <= self.config.token_max {
            debug!(inputs = inputs.len(), total, "Reducing in a single pass");
            return self.call(&self.config.combine_prompt, &texts).await;
        }

        info!(
            inputs = inputs.len(),
            total,
            token_max = self.config.token_max,
            "Input over budget, using map-reduce"
        );

        let mut pieces = Vec::new();
        for input in inputs {
            pieces.extend(self.split_input(input)?);
        }

        let mut partials = Vec::new();
        for group in self.partition(&pieces)? {
            partials.push(self.call(&self.config.map_prompt, &group).await?);
        }

        let mut current_total = self.joined_tokens(&partials);
        while current_total > self.config.token_max {
            let groups = self.partition(&partials)?;
            debug!(
                partials = partials.len(),
                groups = groups.len(),
                current_total,
                "Collapsing partial summaries"
            );

            let mut collapsed = Vec::with_capacity(groups.len());
            for group in groups {
                collapsed.push(self.call(&self.config.combine_prompt, &group).await?);
            }

            let next_total = self.joined_tokens(&collapsed);
            if next_total >= current_total {
                return Err(DigestError::BudgetExceeded {
                    tokens: next_total,
                    budget: self.config.token_max,
                });
            }
            partials = collapsed;
            current_total = next_total;
        }

        self.call(&self.config.combine_prompt, &partials).await
    }

    async fn call(&self, template: &str, texts: &[String]) -> Result<String> {
        let prompt = prompts::render(template, &texts.join(DOC_SEPARATOR));
        self.llm.summarize(&prompt).await
    }

    /// Split an input into chunks of at most `chunk_tokens`, keeping its
    /// citation marker on every chunk. Inputs within budget pass through.
    fn split_input(&self, input: &ReduceInput) -> Result<Vec<String>> {
        if self.count(&input.text) <= self.config.token_max {
            return Ok(vec![input.text.clone()]);
        }

        let Some(tag) = &input.tag else {
            return self.split_text(&input.text, SPLIT_SEPARATORS);
        };

        let marker = marker(tag);
        let body = input
            .text
            .trim_end()
            .strip_suffix(marker.as_str())
            .unwrap_or(input.text.as_str());
        let chunks = self.split_text(body, SPLIT_SEPARATORS)?;
        debug!(tag = %tag, chunks = chunks.len(), "Split oversized document");
        Ok(chunks
            .into_iter()
            .map(|chunk| format!("{}{}", chunk, marker))
            .collect())
    }

    fn split_text(&self, text: &str, separators: &[&str]) -> Result<Vec<String>> {
        let limit = self.config.chunk_tokens;
        let tokens = self.count(text);
        if tokens <= limit {
            return Ok(vec![text.to_string()]);
        }
        let Some((sep, finer)) = separators.split_first() else {
            return Err(DigestError::BudgetExceeded {
                tokens,
                budget: limit,
            });
        };

        let mut chunks = Vec::new();
        let mut current = String::new();
        for part in text.split(sep).filter(|p| !p.trim().is_empty()) {
            let candidate = if current.is_empty() {
                part.to_string()
            } else {
                format!("{}{}{}", current, sep, part)
            };
            if self.count(&candidate) <= limit {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            if self.count(part) <= limit {
                current = part.to_string();
            } else {
                chunks.extend(self.split_text(part, finer)?);
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        Ok(chunks)
    }

    /// Pack texts, in order, into groups whose joined size fits `token_max`.
    fn partition(&self, texts: &[String]) -> Result<Vec<Vec<String>>> {
        let limit = self.config.token_max;
        let mut groups = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for text in texts {
            let tokens = self.count(text);
            if tokens > limit {
                return Err(DigestError::BudgetExceeded {
                    tokens,
                    budget: limit,
                });
            }

            current.push(text.clone());
            if current.len() > 1 && self.joined_tokens(&current) > limit {
                current.pop();
                groups.push(std::mem::take(&mut current));
                current.push(text.clone());
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        Ok(groups)
    }
}
