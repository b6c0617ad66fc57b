mod config;
mod digest;
mod sources;
mod topic;

use std::path::PathBuf;

use clap::Subcommand;

use crate::state::AppState;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize every topic and write the full digest
    Digest {
        /// Write the markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a single topic
    Topic {
        /// Topic key: security, ai, iot, blockchain
        name: String,
    },

    /// List the links each topic would summarize
    Sources {
        /// Only this topic
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

pub async fn run(command: Command, state: &AppState) -> anyhow::Result<()> {
    match command {
        Command::Digest { output } => digest::run(state, output).await,
        Command::Topic { name } => topic::run(state, &name).await,
        Command::Sources { topic } => sources::run(state, topic.as_deref()).await,
        Command::Config => config::run(state),
    }
}
