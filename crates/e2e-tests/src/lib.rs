//! End-to-end test infrastructure for the chat backend.
//!
//! Provides a shared TestHarness that wires real storage with mock
//! collaborators so tests can drive the whole question-to-answer pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use rag_llm::{ChatModel, CollectingHandler, MockChatModel};
use rag_retrieval::{Assessor, AugmentationOrchestrator, OrchestratorConfig};
use rag_service::{ChatResponse, ChatService, ServiceConfig, ServiceError, TokenCounter};
use rag_storage::{RocksSessionStore, SessionStore, Storage};
use rag_types::{Document, SessionRetrievalState};
use rag_vector::VectorSearch;
use rag_websearch::{WebResult, WebSearch};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance
    pub storage: Arc<Storage>,
    /// Session retrieval-state store backed by `storage`
    pub session_store: Arc<RocksSessionStore>,
    /// Directory for the vector index
    pub index_path: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with temp directory and storage.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage = Arc::new(
            Storage::open(&temp_dir.path().join("db")).expect("Failed to open test storage"),
        );
        let session_store = Arc::new(RocksSessionStore::new(Arc::clone(&storage)));
        let index_path = temp_dir.path().join("vector-index");

        Self {
            _temp_dir: temp_dir,
            storage,
            session_store,
            index_path,
        }
    }

    /// Build a chat service over this harness's storage.
    pub fn service(
        &self,
        assessor: Arc<dyn Assessor>,
        vector_search: Arc<dyn VectorSearch>,
        web_search: Option<Arc<dyn WebSearch>>,
        model: Arc<dyn ChatModel>,
        config: OrchestratorConfig,
    ) -> ChatService {
        let orchestrator = Arc::new(AugmentationOrchestrator::new(
            assessor,
            vector_search,
            web_search,
            config,
        ));
        ChatService::with_token_counter(
            Arc::clone(&self.storage),
            self.session_store.clone(),
            orchestrator,
            model,
            ServiceConfig::default(),
            TokenCounter::estimating(),
        )
    }

    /// Retrieval state currently stored for a session.
    pub async fn retrieval_state(&self, session_id: &str) -> SessionRetrievalState {
        self.session_store
            .get(session_id)
            .await
            .expect("Failed to read retrieval state")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Ask one question and wait for its messages to be persisted.
pub async fn ask(
    service: &ChatService,
    session_id: &str,
    question: &str,
) -> Result<ChatResponse, ServiceError> {
    let mut handler = CollectingHandler::default();
    let response = service.answer(session_id, question, None, &mut handler).await;
    service.flush().await;
    response
}

/// Outdated election coverage from the local corpus.
pub fn election_documents() -> Vec<Document> {
    vec![
        Document::new("The 2020 election was decided in early November 2020."),
        Document::new("Polling for the 2024 election opened in January 2024."),
        Document::new("Candidates filed for the 2024 primaries in late 2023."),
    ]
}

/// Fresh web coverage of the election result.
pub fn election_web_results() -> Vec<WebResult> {
    vec![
        WebResult::new(
            "Election results",
            "The winner of the 2024 election was announced on November 6.",
            "https://news.example/results",
        ),
        WebResult::new(
            "Final tally",
            "All states certified the 2024 election results in December.",
            "https://news.example/tally",
        ),
    ]
}

/// A conversational model whose answers echo the question.
pub fn echo_model() -> MockChatModel {
    MockChatModel::new("").with_responder(|messages| {
        let question = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("Answer to: {}", question))
    })
}
