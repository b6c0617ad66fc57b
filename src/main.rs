mod commands;
mod digest;
mod docs;
mod error;
mod llm;
mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use digest::DigestEngine;
use docs::feeds::{CsvFeedFetcher, FeedSource};
use docs::ingest::{Extractor, WebExtractor};
use docs::{CachedExtractor, ExtractCache};
use llm::{token_counter_for, LlmClient, LlmSettings};
use state::{AppState, DigestConfig};

#[derive(Parser)]
#[command(
    name = "seit-digest",
    about = "Cited markdown digest of recently published articles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Lookback window in hours
    #[arg(long, global = true)]
    hours: Option<i64>,

    /// Stuff/map-reduce token threshold
    #[arg(long, global = true)]
    token_max: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenv::dotenv();

    let mut config = DigestConfig::from_env()?;
    if let Some(hours) = cli.hours {
        config.lookback_hours = hours;
    }
    if let Some(token_max) = cli.token_max {
        config.token_max = token_max;
    }

    let llm_client = Arc::new(LlmClient::new(LlmSettings::from_env())?);
    info!(model = %llm_client.settings().model, "LLM client initialized");
    let counter = token_counter_for(&llm_client.settings().model);

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("seit-digest/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let cache = ExtractCache::new(&config.cache_dir, config.cache_ttl_hours)?;
    info!("Extraction cache at {:?}", config.cache_dir);

    let web = Arc::new(WebExtractor::new(
        http.clone(),
        config.extract_api_url.clone(),
        config.extract_api_key.clone(),
    ));
    let extractor: Arc<dyn Extractor> = Arc::new(CachedExtractor::new(web, cache));
    let feeds: Arc<dyn FeedSource> = Arc::new(CsvFeedFetcher::new(http));

    let engine = DigestEngine::new(
        feeds,
        extractor,
        llm_client,
        counter,
        config.document_reduce(),
        config.topic_reduce(),
        config.lookback_hours,
    );

    let state = AppState { config, engine };

    commands::run(cli.command, &state).await
}
