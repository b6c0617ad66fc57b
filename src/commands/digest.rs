use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::state::AppState;

/// Run all three stages and emit the markdown digest.
pub async fn run(state: &AppState, output: Option<PathBuf>) -> anyhow::Result<()> {
    info!(topics = state.config.topics.len(), "Digest started");

    let digest = state.engine.run(&state.config.topics).await;
    let markdown = digest.to_markdown();

    match output {
        Some(path) => {
            tokio::fs::write(&path, &markdown)
                .await
                .with_context(|| format!("Failed to write digest to {}", path.display()))?;
            info!(path = %path.display(), size = markdown.len(), "Digest written");
        }
        None => println!("{}", markdown),
    }

    Ok(())
}
