//! Command implementations for the chat daemon.
//!
//! Handles:
//! - ask/chat: wire the pipeline and stream answers to stdout
//! - sessions: list, create, delete, history, stats
//! - ingest: build the index directory from JSONL
//! - config: print the effective settings

use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader as AsyncBufReader};
use tracing::{info, warn};

use rag_llm::{ApiChatModel, ApiChatModelConfig, ChatModel, LlmError, StreamHandler};
use rag_retrieval::{AugmentationOrchestrator, ConfidenceAssessor, OrchestratorConfig};
use rag_service::{ChatService, ServiceConfig};
use rag_storage::{RocksSessionStore, Storage};
use rag_types::Settings;
use rag_vector::{
    ingest_documents, read_documents, ApiEmbedder, Embedder, IngestStats, SemanticIndex,
    DEFAULT_BATCH_SIZE,
};
use rag_websearch::{GoogleSearchClient, GoogleSearchConfig, WebSearch};

use crate::cli::SessionCommands;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

/// Install the tracing subscriber; logs go to stderr.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    fs::create_dir_all(&db_path).context("Failed to create database directory")?;
    info!("Opening storage at {:?}", db_path);
    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

/// Wire storage, models, the index and web search into a chat service.
fn build_service(settings: &Settings) -> Result<ChatService> {
    let storage = open_storage(settings)?;

    let llm_config =
        ApiChatModelConfig::from_settings(&settings.llm).context("Invalid LLM configuration")?;
    let model: Arc<dyn ChatModel> =
        Arc::new(ApiChatModel::new(llm_config).context("Failed to create chat model")?);

    let embedder: Arc<dyn Embedder> = Arc::new(
        ApiEmbedder::from_settings(&settings.embedding)
            .context("Invalid embedding configuration")?,
    );
    let index_path = settings.expanded_index_path();
    let index = SemanticIndex::open(&index_path, embedder).with_context(|| {
        format!(
            "Failed to load document index at {:?} (run `rag-daemon ingest` first)",
            index_path
        )
    })?;
    let stats = index.index().stats();
    info!(
        documents = stats.vector_count,
        dimension = stats.dimension,
        model = %stats.model,
        "Loaded document index"
    );

    let web_search: Option<Arc<dyn WebSearch>> = if settings.websearch.enabled {
        let client = GoogleSearchClient::new(GoogleSearchConfig::from_settings(&settings.websearch))
            .context("Failed to create web search client")?;
        if !client.has_credentials() {
            warn!("Web search credentials missing, escalation will find no results");
        }
        Some(Arc::new(client))
    } else {
        None
    };

    let assessor = Arc::new(ConfidenceAssessor::new(
        Arc::clone(&model),
        settings.retrieval.confidence_scores.clone(),
    ));
    let orchestrator = Arc::new(AugmentationOrchestrator::new(
        assessor,
        Arc::new(index),
        web_search,
        OrchestratorConfig::from_settings(&settings.retrieval),
    ));
    let session_store = Arc::new(RocksSessionStore::new(Arc::clone(&storage)));

    Ok(ChatService::new(
        storage,
        session_store,
        orchestrator,
        model,
        ServiceConfig::from_settings(settings),
    ))
}

/// Prints streamed tokens to stdout as they arrive.
#[derive(Default)]
pub struct StdoutHandler {
    printed: bool,
}

impl StreamHandler for StdoutHandler {
    fn on_token(&mut self, token: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
        self.printed = true;
    }

    fn on_complete(&mut self, _full_text: &str) {
        println!();
    }

    fn on_error(&mut self, _error: &LlmError) {
        if self.printed {
            println!();
        }
    }
}

fn session_or_new(service: &ChatService, session: Option<String>, title: &str) -> Result<String> {
    match session {
        Some(id) => {
            service.get_session(&id).context("Unknown session")?;
            Ok(id)
        }
        None => {
            let session = service
                .create_session(title)
                .context("Failed to create session")?;
            eprintln!("Session: {}", session.session_id);
            Ok(session.session_id)
        }
    }
}

/// Answer one question.
pub async fn handle_ask(
    settings: &Settings,
    session: Option<String>,
    top_k: Option<usize>,
    question: &str,
) -> Result<()> {
    let service = build_service(settings)?;
    let session_id = session_or_new(&service, session, question)?;

    let mut handler = StdoutHandler::default();
    let result = service
        .answer(&session_id, question, top_k, &mut handler)
        .await;
    service.shutdown().await;

    let response = result.context("Failed to answer question")?;
    if response.used_web_search {
        eprintln!("(context augmented with web search results)");
    }
    Ok(())
}

/// Line-oriented chat over stdin until EOF or `/quit`.
pub async fn handle_chat(settings: &Settings, session: Option<String>) -> Result<()> {
    let service = build_service(settings)?;
    let session_id = session_or_new(&service, session, "Chat")?;

    let mut lines = AsyncBufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "/quit" || question == "/exit" {
            break;
        }

        let mut handler = StdoutHandler::default();
        if let Err(e) = service
            .answer(&session_id, question, None, &mut handler)
            .await
        {
            eprintln!("Error: {}", e);
        }
        // next turn must see this one in its history
        service.flush().await;
    }

    service.shutdown().await;
    Ok(())
}

/// Session management without loading models or the index.
pub fn handle_sessions(settings: &Settings, command: SessionCommands) -> Result<()> {
    let storage = open_storage(settings)?;

    match command {
        SessionCommands::List => {
            let sessions = storage.list_sessions().context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("No sessions");
            }
            for session in sessions {
                println!(
                    "{}  {}  {}",
                    session.session_id,
                    session.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    session.title
                );
            }
        }
        SessionCommands::Create { title } => {
            let session = storage
                .create_session(&title)
                .context("Failed to create session")?;
            println!("{}", session.session_id);
        }
        SessionCommands::Delete { session_id } => {
            let deleted = storage
                .delete_session(&session_id)
                .context("Failed to delete session")?;
            if !deleted {
                anyhow::bail!("Session not found: {}", session_id);
            }
            println!("Deleted {}", session_id);
        }
        SessionCommands::History { session_id } => {
            if storage.get_session(&session_id)?.is_none() {
                anyhow::bail!("Session not found: {}", session_id);
            }
            for message in storage.get_messages(&session_id)? {
                println!("[{}] {}: {}", message.seq, message.role, message.content);
            }
        }
        SessionCommands::Stats => {
            let stats = storage.get_stats().context("Failed to read storage stats")?;
            println!("Sessions:       {}", stats.session_count);
            println!("Messages:       {}", stats.message_count);
            println!("Cached states:  {}", stats.cached_state_count);
        }
    }

    Ok(())
}

/// Embed a JSONL corpus into a fresh index directory.
pub async fn handle_ingest(settings: &Settings, input: &str, output: Option<&str>) -> Result<()> {
    let embedder = ApiEmbedder::from_settings(&settings.embedding)
        .context("Invalid embedding configuration")?;
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.expanded_index_path());

    let stats = ingest_file(Path::new(input), &output, &embedder).await?;
    println!(
        "Indexed {} documents ({} skipped) into {:?}",
        stats.indexed, stats.skipped, output
    );
    Ok(())
}

async fn ingest_file(
    input: &Path,
    output: &Path,
    embedder: &dyn Embedder,
) -> Result<IngestStats> {
    let file = fs::File::open(input).with_context(|| format!("Failed to open {:?}", input))?;
    let documents = read_documents(BufReader::new(file)).context("Failed to parse corpus")?;

    let stats = ingest_documents(output, embedder, documents, DEFAULT_BATCH_SIZE)
        .await
        .with_context(|| format!("Failed to build index at {:?}", output))?;
    Ok(stats)
}

/// Print the effective settings as TOML with API keys masked.
pub fn show_config(settings: &Settings) -> Result<()> {
    let rendered =
        toml::to_string_pretty(&settings.redacted()).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_vector::{DocumentIndex, HashEmbedder};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ingest_file_builds_index() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("docs.jsonl");
        let output = temp.path().join("vector-index");
        fs::write(
            &input,
            "{\"content\": \"alpha\", \"metadata\": {}}\n\n{\"content\": \"beta\"}\n",
        )
        .unwrap();
        let embedder = HashEmbedder::new(64);

        let stats = ingest_file(&input, &output, &embedder).await.unwrap();
        assert_eq!(stats.indexed, 2);

        // re-ingesting replaces the previous build
        ingest_file(&input, &output, &embedder).await.unwrap();
        let index = DocumentIndex::open(&output).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().model, "hash");
        assert_eq!(index.dimension(), 64);
    }

    #[tokio::test]
    async fn test_ingest_file_reports_missing_input() {
        let temp = TempDir::new().unwrap();
        let embedder = HashEmbedder::new(8);
        let err = ingest_file(
            &temp.path().join("missing.jsonl"),
            &temp.path().join("vector-index"),
            &embedder,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_show_config_renders_defaults() {
        assert!(show_config(&Settings::default()).is_ok());
    }
}
