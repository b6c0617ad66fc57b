use tracing::info;

use crate::digest::TopicOutcome;
use crate::docs::find_topic;
use crate::state::AppState;

/// Summarize one topic (stages 1 and 2).
pub async fn run(state: &AppState, name: &str) -> anyhow::Result<()> {
    let Some(topic) = find_topic(&state.config.topics, name) else {
        let known: Vec<_> = state.config.topics.iter().map(|t| t.key.as_str()).collect();
        anyhow::bail!("Unknown topic '{}'. Valid: {}", name, known.join(", "));
    };

    let result = state.engine.run_topic(topic).await;
    if let TopicOutcome::Summarized(summary) = &result.outcome {
        info!(topic = %topic.key, cited = summary.citations.len(), "Topic complete");
    }

    println!("{}", result.to_markdown(state.engine.lookback_hours()));

    if let TopicOutcome::Failed(reason) = result.outcome {
        anyhow::bail!("Topic '{}' failed: {}", topic.key, reason);
    }
    Ok(())
}
