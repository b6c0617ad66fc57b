use crate::digest::citations::source_tag;
use crate::docs::types::Topic;
use crate::state::AppState;

/// List qualifying links per topic without summarizing anything.
pub async fn run(state: &AppState, only: Option<&str>) -> anyhow::Result<()> {
    let topics: Vec<&Topic> = match only {
        Some(name) => match crate::docs::find_topic(&state.config.topics, name) {
            Some(t) => vec![t],
            None => anyhow::bail!("Unknown topic '{}'", name),
        },
        None => state.config.topics.iter().collect(),
    };

    let hours = state.engine.lookback_hours();
    let mut output = format!("Links published in the last {} hours\n\n", hours);
    for topic in topics {
        let links = state.engine.fetch_links(topic).await;
        output.push_str(&format!("{} ({})\n", topic.title, links.len()));
        if links.is_empty() {
            output.push_str("  (none)\n");
        }
        for link in &links {
            output.push_str(&format!("  [{}] {}\n", source_tag(link), link));
        }
        output.push('\n');
    }

    print!("{}", output);
    Ok(())
}
