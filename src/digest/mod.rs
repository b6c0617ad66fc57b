pub mod citations;
pub mod prompts;
pub mod reduce;

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::docs::feeds::FeedSource;
use crate::docs::ingest::Extractor;
use crate::docs::types::{CitationMap, SourceDocument, Summary, Topic};
use crate::error::Result;
use crate::llm::{Summarizer, TokenCounter};
use crate::state::ReduceConfig;

use citations::{marker, rewrite_citations, tag_document, tag_text};
use reduce::{ChunkedReducer, ReduceInput};

/// Result of the topic-level reduction.
#[derive(Debug, Clone)]
pub struct TopicSummary {
    /// Summary with numbered citation links, for display.
    pub rendered: String,
    /// Summary with raw `[tag]` markers, fed to the final reduction.
    pub raw: String,
    /// Markers that survived into `raw`.
    pub citations: CitationMap,
}

#[derive(Debug, Clone)]
pub enum TopicOutcome {
    NoArticles,
    Summarized(TopicSummary),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TopicDigest {
    pub topic: Topic,
    pub outcome: TopicOutcome,
}

#[derive(Debug, Clone)]
pub struct Digest {
    pub lookback_hours: i64,
    pub topics: Vec<TopicDigest>,
    pub overall: OverallOutcome,
}

/// What the cross-topic section shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverallOutcome {
    /// No topic had any articles in the window.
    NoArticles,
    Summarized(String),
    /// Stage 3 failed, or every topic with articles failed before it.
    Failed(String),
}

/// Runs the three-stage summarization over a set of topics.
///
/// Stage 1 summarizes each document alone, stage 2 reduces a topic's
/// document summaries into one cited summary, stage 3 reduces the topic
/// summaries into one cross-topic summary. Everything runs sequentially.
pub struct DigestEngine {
    feeds: Arc<dyn FeedSource>,
    extractor: Arc<dyn Extractor>,
    document_reducer: ChunkedReducer,
    topic_reducer: ChunkedReducer,
    lookback_hours: i64,
}

impl DigestEngine {
    pub fn new(
        feeds: Arc<dyn FeedSource>,
        extractor: Arc<dyn Extractor>,
        llm: Arc<dyn Summarizer>,
        counter: Arc<dyn TokenCounter>,
        document_config: ReduceConfig,
        topic_config: ReduceConfig,
        lookback_hours: i64,
    ) -> Self {
        Self {
            feeds,
            extractor,
            document_reducer: ChunkedReducer::new(document_config, llm.clone(), counter.clone()),
            topic_reducer: ChunkedReducer::new(topic_config, llm, counter),
            lookback_hours,
        }
    }

    pub fn lookback_hours(&self) -> i64 {
        self.lookback_hours
    }

    /// Recent links for a topic. An unreachable feed yields no links.
    pub async fn fetch_links(&self, topic: &Topic) -> Vec<String> {
        match self.feeds.fetch(topic, self.lookback_hours).await {
            Ok(links) => links,
            Err(e) => {
                warn!(topic = %topic.key, "Feed unavailable, treating topic as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch and extract a topic's documents, dropping links that fail.
    pub async fn collect_documents(&self, topic: &Topic) -> Vec<SourceDocument> {
        let links = self.fetch_links(topic).await;
        let mut docs = Vec::with_capacity(links.len());

        for url in links {
            match self.extractor.extract(&url).await {
                Ok(text) => docs.push(SourceDocument {
                    text,
                    source_id: url,
                }),
                Err(e) => warn!(topic = %topic.key, "Dropping link: {}", e),
            }
        }

        info!(topic = %topic.key, doc_count = docs.len(), "Documents collected");
        docs
    }

    /// Stage 1: tag one document and reduce it on its own.
    pub async fn summarize_document(&self, doc: &SourceDocument) -> Result<Summary> {
        let tagged = tag_document(doc);
        let text = self
            .document_reducer
            .reduce(&[ReduceInput::from(&tagged)])
            .await?;

        debug!(tag = %tagged.tag, summary_len = text.len(), "Document summarized");
        Ok(Summary {
            text,
            tag: Some(tagged.tag),
            source_id: Some(tagged.source_id),
        })
    }

    /// Stage 2: reduce a topic's document summaries and number its citations.
    pub async fn summarize_topic(&self, summaries: &[Summary]) -> Result<TopicSummary> {
        let mut sources = CitationMap::new();
        let mut inputs = Vec::with_capacity(summaries.len());

        for summary in summaries {
            match (&summary.tag, &summary.source_id) {
                (Some(tag), Some(url)) => {
                    sources.insert(marker(tag), url.as_str());
                    inputs.push(ReduceInput {
                        text: tag_text(&summary.text, tag),
                        tag: Some(tag.clone()),
                    });
                }
                _ => inputs.push(ReduceInput::from(summary)),
            }
        }

        let raw = self.topic_reducer.reduce(&inputs).await?;
        let (rendered, citations) = rewrite_citations(&raw, &sources);

        info!(
            inputs = inputs.len(),
            available = sources.len(),
            cited = citations.len(),
            "Topic summarized"
        );
        Ok(TopicSummary {
            rendered,
            raw,
            citations,
        })
    }

    /// Stage 3: reduce topic summaries into one cross-topic summary.
    ///
    /// Citation maps are merged in the order given; a later topic wins on a
    /// marker collision.
    pub async fn summarize_overall(&self, topics: &[&TopicSummary]) -> Result<Option<String>> {
        if topics.is_empty() {
            return Ok(None);
        }

        let inputs: Vec<ReduceInput> = topics
            .iter()
            .map(|t| ReduceInput::untagged(t.raw.clone()))
            .collect();

        let mut merged = CitationMap::new();
        for topic in topics {
            merged.merge(&topic.citations);
        }

        let raw = self.topic_reducer.reduce(&inputs).await?;
        let (rendered, used) = rewrite_citations(&raw, &merged);

        info!(
            topics = topics.len(),
            available = merged.len(),
            cited = used.len(),
            "Overall summary complete"
        );
        Ok(Some(rendered))
    }

    /// Stages 1 and 2 for one topic. Failures are captured in the outcome.
    pub async fn run_topic(&self, topic: &Topic) -> TopicDigest {
        let docs = self.collect_documents(topic).await;
        if docs.is_empty() {
            return TopicDigest {
                topic: topic.clone(),
                outcome: TopicOutcome::NoArticles,
            };
        }

        let outcome = match self.summarize_documents(&docs).await {
            Ok(summary) => TopicOutcome::Summarized(summary),
            Err(e) => {
                error!(topic = %topic.key, "Topic summarization failed: {}", e);
                TopicOutcome::Failed(e.to_string())
            }
        };

        TopicDigest {
            topic: topic.clone(),
            outcome,
        }
    }

    async fn summarize_documents(&self, docs: &[SourceDocument]) -> Result<TopicSummary> {
        let mut summaries = Vec::with_capacity(docs.len());
        for doc in docs {
            summaries.push(self.summarize_document(doc).await?);
        }
        self.summarize_topic(&summaries).await
    }

    /// Full run over `topics`, in order.
    pub async fn run(&self, topics: &[Topic]) -> Digest {
        let mut results = Vec::with_capacity(topics.len());
        for topic in topics {
            info!(topic = %topic.key, "Processing topic");
            results.push(self.run_topic(topic).await);
        }

        let summaries: Vec<&TopicSummary> = results
            .iter()
            .filter_map(|r| match &r.outcome {
                TopicOutcome::Summarized(s) => Some(s),
                _ => None,
            })
            .collect();

        let failed = results
            .iter()
            .filter(|r| matches!(r.outcome, TopicOutcome::Failed(_)))
            .count();

        let overall = match self.summarize_overall(&summaries).await {
            Ok(Some(text)) => OverallOutcome::Summarized(text),
            Ok(None) if failed > 0 => OverallOutcome::Failed(format!(
                "all {} topic(s) with articles failed to summarize",
                failed
            )),
            Ok(None) => OverallOutcome::NoArticles,
            Err(e) => {
                error!("Overall summarization failed: {}", e);
                OverallOutcome::Failed(e.to_string())
            }
        };

        Digest {
            lookback_hours: self.lookback_hours,
            topics: results,
            overall,
        }
    }
}

/// Notice shown for a topic with nothing in the lookback window.
pub fn no_articles_notice(hours: i64) -> String {
    format!("No articles published in the last {} hours.", hours)
}

impl TopicDigest {
    pub fn to_markdown(&self, hours: i64) -> String {
        let body = match &self.outcome {
            TopicOutcome::NoArticles => no_articles_notice(hours),
            TopicOutcome::Summarized(s) => s.rendered.trim().to_string(),
            TopicOutcome::Failed(reason) => format!("_Summary unavailable: {}_", reason),
        };
        format!("## {}\n\n{}\n", self.topic.title, body)
    }
}

impl Digest {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Paper Summaries\n\n");
        for topic in &self.topics {
            out.push_str(&topic.to_markdown(self.lookback_hours));
            out.push('\n');
        }
        out.push_str("## Overall\n\n");
        match &self.overall {
            OverallOutcome::Summarized(text) => out.push_str(text.trim()),
            OverallOutcome::NoArticles => out.push_str(&no_articles_notice(self.lookback_hours)),
            OverallOutcome::Failed(reason) => {
                out.push_str(&format!("_Summary unavailable: {}_", reason))
            }
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::Topic;
    use crate::error::DigestError;
    use async_trait::async_trait;
    use citations::source_tag;
    use reduce::tests::{word_counter, ScriptedSummarizer};
    use std::collections::HashMap;

    struct StaticFeeds(HashMap<String, Vec<String>>);

    #[async_trait]
    impl FeedSource for StaticFeeds {
        async fn fetch(&self, topic: &Topic, _hours: i64) -> Result<Vec<String>> {
            match self.0.get(&topic.key) {
                Some(links) => Ok(links.clone()),
                None => Err(DigestError::FetchFailed {
                    topic: topic.key.clone(),
                    message: "HTTP 404".to_string(),
                }),
            }
        }
    }

    /// Serves "article text for <url>", failing for URLs containing "broken".
    struct FakeExtractor;

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, url: &str) -> Result<String> {
            if url.contains("broken") {
                return Err(DigestError::ExtractionFailed {
                    url: url.to_string(),
                    message: "timeout".to_string(),
                });
            }
            Ok(format!("article text for {}", url))
        }
    }

    fn topic(key: &str) -> Topic {
        Topic::new(key, &key.to_uppercase(), &format!("https://feeds.example/{}.csv", key))
    }

    fn cfg(template: &str) -> ReduceConfig {
        ReduceConfig {
            map_prompt: format!("{} MAP:{{docs}}", template),
            combine_prompt: format!("{} COMBINE:{{docs}}", template),
            token_max: 1000,
            chunk_tokens: 100,
        }
    }

    fn engine(feeds: HashMap<String, Vec<String>>, llm: Arc<ScriptedSummarizer>) -> DigestEngine {
        DigestEngine::new(
            Arc::new(StaticFeeds(feeds)),
            Arc::new(FakeExtractor),
            llm,
            word_counter(),
            cfg("DOC"),
            cfg("TOPIC"),
            24,
        )
    }

    /// Document prompts echo back their marker, topic prompts cite every
    /// marker they see.
    fn citing_llm() -> Arc<ScriptedSummarizer> {
        Arc::new(ScriptedSummarizer::new(|prompt| {
            let markers: Vec<&str> = prompt
                .match_indices('[')
                .filter_map(|(i, _)| prompt.get(i..i + 9))
                .filter(|m| m.ends_with(']'))
                .collect();
            if prompt.starts_with("DOC") {
                Ok(format!("doc summary {}", markers.join(" ")))
            } else {
                Ok(format!("Findings {}.", markers.join(" and ")))
            }
        }))
    }

    #[tokio::test]
    async fn test_stage_one_tags_before_reduction() {
        let llm = Arc::new(ScriptedSummarizer::fixed("summary"));
        let engine = engine(HashMap::new(), llm.clone());
        let doc = SourceDocument {
            text: "Body.".to_string(),
            source_id: "https://news.example/a".to_string(),
        };

        let summary = engine.summarize_document(&doc).await.unwrap();
        let tag = source_tag("https://news.example/a");
        assert_eq!(summary.tag.as_deref(), Some(tag.as_str()));
        assert_eq!(summary.source_id.as_deref(), Some("https://news.example/a"));
        assert!(llm.prompts.lock().unwrap()[0].contains(&format!("Body.[{}]", tag)));
        assert_eq!(doc.text, "Body.");
    }

    #[tokio::test]
    async fn test_topic_rewrites_cited_sources() {
        let llm = Arc::new(ScriptedSummarizer::fixed(
            "Patch now [abc1234]. Phishing is up [def5678].",
        ));
        let engine = engine(HashMap::new(), llm.clone());
        let summaries = vec![
            Summary {
                text: "first".to_string(),
                tag: Some("abc1234".to_string()),
                source_id: Some("https://a.example".to_string()),
            },
            Summary {
                text: "second".to_string(),
                tag: Some("def5678".to_string()),
                source_id: Some("https://b.example".to_string()),
            },
        ];

        let out = engine.summarize_topic(&summaries).await.unwrap();
        assert_eq!(
            out.rendered,
            "Patch now [[1]](https://a.example). Phishing is up [[2]](https://b.example)."
        );
        assert_eq!(out.raw, "Patch now [abc1234]. Phishing is up [def5678].");
        assert_eq!(out.citations.get("[abc1234]"), Some("https://a.example"));
        assert_eq!(out.citations.get("[def5678]"), Some("https://b.example"));

        let prompt = &llm.prompts.lock().unwrap()[0];
        assert!(prompt.contains("first[abc1234]"));
        assert!(prompt.contains("second[def5678]"));
    }

    #[tokio::test]
    async fn test_topic_drops_uncited_source() {
        let llm = Arc::new(ScriptedSummarizer::fixed("Only this [abc1234]."));
        let engine = engine(HashMap::new(), llm);
        let summaries = vec![
            Summary {
                text: "first".to_string(),
                tag: Some("abc1234".to_string()),
                source_id: Some("https://a.example".to_string()),
            },
            Summary {
                text: "second".to_string(),
                tag: Some("def5678".to_string()),
                source_id: Some("https://b.example".to_string()),
            },
        ];

        let out = engine.summarize_topic(&summaries).await.unwrap();
        assert_eq!(out.citations.len(), 1);
        assert!(!out.citations.contains("[def5678]"));
    }

    #[tokio::test]
    async fn test_empty_topic_short_circuits() {
        let llm = Arc::new(ScriptedSummarizer::fixed("unused"));
        let feeds = HashMap::from([("security".to_string(), vec![])]);
        let engine = engine(feeds, llm.clone());

        let digest = engine.run(&[topic("security")]).await;
        assert!(matches!(digest.topics[0].outcome, TopicOutcome::NoArticles));
        assert_eq!(digest.overall, OverallOutcome::NoArticles);
        assert_eq!(llm.calls(), 0);

        let md = digest.topics[0].to_markdown(24);
        assert!(md.contains("No articles published in the last 24 hours."));
    }

    #[tokio::test]
    async fn test_unreachable_feed_and_broken_links_degrade() {
        let llm = citing_llm();
        let feeds = HashMap::from([(
            "ai".to_string(),
            vec![
                "https://news.example/broken".to_string(),
                "https://news.example/ok".to_string(),
            ],
        )]);
        let engine = engine(feeds, llm.clone());

        let digest = engine.run(&[topic("iot"), topic("ai")]).await;
        assert!(matches!(digest.topics[0].outcome, TopicOutcome::NoArticles));

        let TopicOutcome::Summarized(ai) = &digest.topics[1].outcome else {
            panic!("ai topic should be summarized");
        };
        assert_eq!(ai.citations.len(), 1);
        assert_eq!(
            ai.citations.get(&marker(&source_tag("https://news.example/ok"))),
            Some("https://news.example/ok")
        );
    }

    #[tokio::test]
    async fn test_full_run_numbers_final_citations_locally() {
        let llm = citing_llm();
        let feeds = HashMap::from([
            ("security".to_string(), vec!["https://s.example/1".to_string()]),
            (
                "ai".to_string(),
                vec!["https://a.example/1".to_string(), "https://a.example/2".to_string()],
            ),
            ("blockchain".to_string(), vec![]),
        ]);
        let engine = engine(feeds, llm.clone());

        let digest = engine
            .run(&[topic("security"), topic("ai"), topic("blockchain")])
            .await;

        let TopicOutcome::Summarized(ai) = &digest.topics[1].outcome else {
            panic!("ai topic should be summarized");
        };
        assert!(ai.rendered.contains("[[1]](https://a.example/1)"));
        assert!(ai.rendered.contains("[[2]](https://a.example/2)"));

        let OverallOutcome::Summarized(overall) = &digest.overall else {
            panic!("overall summary expected, got {:?}", digest.overall);
        };
        assert!(overall.contains("[[1]](https://s.example/1)"));
        assert!(overall.contains("[[2]](https://a.example/1)"));
        assert!(overall.contains("[[3]](https://a.example/2)"));

        // The final reduction sees only the two non-empty topics' raw text.
        let prompts = llm.prompts.lock().unwrap();
        let last = prompts.last().unwrap();
        assert!(last.contains(&marker(&source_tag("https://s.example/1"))));
        assert!(!last.contains("[[1]]"));

        let md = digest.to_markdown();
        assert!(md.contains("## SECURITY"));
        assert!(md.contains("## BLOCKCHAIN\n\nNo articles published in the last 24 hours."));
        assert!(md.contains("## Overall"));
    }

    #[tokio::test]
    async fn test_failed_topic_is_isolated() {
        let llm = Arc::new(ScriptedSummarizer::new(|prompt| {
            if prompt.contains("https://bad.example") || prompt.contains("fail-me") {
                Err(DigestError::SummarizationFailed("model offline".to_string()))
            } else {
                Ok("fine".to_string())
            }
        }));
        let feeds = HashMap::from([
            ("security".to_string(), vec!["https://bad.example/fail-me".to_string()]),
            ("ai".to_string(), vec!["https://good.example/1".to_string()]),
        ]);
        let engine = engine(feeds, llm);

        let digest = engine.run(&[topic("security"), topic("ai")]).await;
        assert!(matches!(digest.topics[0].outcome, TopicOutcome::Failed(_)));
        assert!(matches!(digest.topics[1].outcome, TopicOutcome::Summarized(_)));
        assert_eq!(digest.overall, OverallOutcome::Summarized("fine".to_string()));
        assert!(digest.topics[0].to_markdown(24).contains("model offline"));
    }

    #[tokio::test]
    async fn test_overall_reports_failure_when_every_topic_failed() {
        let llm = Arc::new(ScriptedSummarizer::new(|prompt| {
            if prompt.starts_with("TOPIC") {
                Err(DigestError::SummarizationFailed("down".to_string()))
            } else {
                Ok("doc summary".to_string())
            }
        }));
        let feeds = HashMap::from([(
            "security".to_string(),
            vec!["https://s.example/1".to_string()],
        )]);
        let engine = engine(feeds, llm);

        let digest = engine.run(&[topic("security")]).await;
        assert!(matches!(digest.overall, OverallOutcome::Failed(_)));

        let md = digest.to_markdown();
        assert!(md.contains("## Overall\n\n_Summary unavailable:"));
        assert!(!md.contains("## Overall\n\nNo articles published"));
    }

    #[tokio::test]
    async fn test_overall_reports_stage_three_failure() {
        // The topic reduction succeeds; only the cross-topic call sees two inputs.
        let llm = Arc::new(ScriptedSummarizer::new(|prompt| {
            if prompt.starts_with("TOPIC") && prompt.contains("topic text\n\ntopic text") {
                Err(DigestError::SummarizationFailed("quota exhausted".to_string()))
            } else if prompt.starts_with("TOPIC") {
                Ok("topic text".to_string())
            } else {
                Ok("doc summary".to_string())
            }
        }));
        let feeds = HashMap::from([
            ("security".to_string(), vec!["https://s.example/1".to_string()]),
            ("ai".to_string(), vec!["https://a.example/1".to_string()]),
        ]);
        let engine = engine(feeds, llm);

        let digest = engine.run(&[topic("security"), topic("ai")]).await;
        assert!(matches!(digest.topics[0].outcome, TopicOutcome::Summarized(_)));
        assert_eq!(
            digest.overall,
            OverallOutcome::Failed("summarization failed: quota exhausted".to_string())
        );
        assert!(digest
            .to_markdown()
            .contains("## Overall\n\n_Summary unavailable: summarization failed: quota exhausted_"));
    }
}
