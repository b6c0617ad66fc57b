use crate::state::AppState;

/// Print the effective configuration.
pub fn run(state: &AppState) -> anyhow::Result<()> {
    let config = &state.config;
    println!("Digest configuration:");
    println!("  lookback_hours:  {}", config.lookback_hours);
    println!("  token_max:       {}", config.token_max);
    println!("  chunk_tokens:    {}", config.chunk_tokens);
    println!("  cache_dir:       {}", config.cache_dir.display());
    println!("  cache_ttl_hours: {}", config.cache_ttl_hours);
    println!(
        "  extraction:      {}",
        config.extract_api_url.as_deref().unwrap_or("direct fetch + html2text")
    );
    println!("  topics:");
    for topic in &config.topics {
        println!("    {:<11} {}", topic.key, topic.feed_url);
    }
    Ok(())
}
