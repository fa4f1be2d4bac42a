//! Retrieval-augmented chat daemon
//!
//! # Usage
//!
//! ```bash
//! rag-daemon ingest --input corpus.jsonl
//! rag-daemon ask [--session ID] [-k N] "Who won the 2024 election?"
//! rag-daemon chat [--session ID]
//! rag-daemon sessions list|create|delete|history
//! rag-daemon config
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/rag-chat/config.toml)
//! 3. Environment variables (RAG_*, e.g. RAG_LLM__API_KEY)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use rag_daemon::{
    handle_ask, handle_chat, handle_ingest, handle_sessions, init_logging, load_settings,
    show_config, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Ask {
            session,
            top_k,
            question,
        } => {
            handle_ask(&settings, session, top_k, &question).await?;
        }
        Commands::Chat { session } => {
            handle_chat(&settings, session).await?;
        }
        Commands::Sessions { command } => {
            handle_sessions(&settings, command)?;
        }
        Commands::Ingest { input, output } => {
            handle_ingest(&settings, &input, output.as_deref()).await?;
        }
        Commands::Config => {
            show_config(&settings)?;
        }
    }

    Ok(())
}
