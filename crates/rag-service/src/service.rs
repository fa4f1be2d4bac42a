//! Chat service: one request from question to streamed answer.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use rag_llm::{ChatModel, CompletionParams, StreamHandler};
use rag_retrieval::AugmentationOrchestrator;
use rag_storage::{SessionStore, Storage};
use rag_types::{
    ChatRole, ConfidenceAssessment, Document, RetrievalDecision, Session, Settings, StoredMessage,
};

use crate::error::ServiceError;
use crate::persist::{PersistMetrics, PersistQueue};
use crate::prompt::{PromptBuilder, TokenCounter};

/// Service settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Lifetime of a session's retrieval state
    pub session_ttl: Duration,
    pub answer_params: CompletionParams,
    pub history_token_budget: usize,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            session_ttl: Duration::from_secs(settings.retrieval.session_ttl_secs),
            answer_params: CompletionParams::new(
                settings.llm.temperature,
                settings.llm.max_tokens,
            ),
            history_token_budget: settings.llm.history_token_budget,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(3600),
            answer_params: CompletionParams::default(),
            history_token_budget: 2000,
        }
    }
}

/// Result of a chat request.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub answer: String,
    /// Documents used as context, web results first
    pub documents: Vec<Document>,
    pub decision: RetrievalDecision,
    /// Confidence of the assembled context before web escalation
    pub confidence: ConfidenceAssessment,
    pub used_web_search: bool,
}

/// Retrieval-augmented chat over persisted sessions.
pub struct ChatService {
    storage: Arc<Storage>,
    session_store: Arc<dyn SessionStore>,
    orchestrator: Arc<AugmentationOrchestrator>,
    model: Arc<dyn ChatModel>,
    prompt: PromptBuilder,
    persist: PersistQueue,
    config: ServiceConfig,
}

impl ChatService {
    /// Must be called inside a tokio runtime; spawns the persist worker.
    pub fn new(
        storage: Arc<Storage>,
        session_store: Arc<dyn SessionStore>,
        orchestrator: Arc<AugmentationOrchestrator>,
        model: Arc<dyn ChatModel>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_token_counter(
            storage,
            session_store,
            orchestrator,
            model,
            config,
            TokenCounter::new(),
        )
    }

    pub fn with_token_counter(
        storage: Arc<Storage>,
        session_store: Arc<dyn SessionStore>,
        orchestrator: Arc<AugmentationOrchestrator>,
        model: Arc<dyn ChatModel>,
        config: ServiceConfig,
        counter: TokenCounter,
    ) -> Self {
        let persist = PersistQueue::spawn(Arc::clone(&storage));
        Self {
            prompt: PromptBuilder::new(counter, config.history_token_budget),
            storage,
            session_store,
            orchestrator,
            model,
            persist,
            config,
        }
    }

    /// Answer `question` in `session_id`, streaming tokens to `handler`.
    ///
    /// The retrieval state is written back before generation starts, so a
    /// failed generation still keeps the new episode. Both messages are
    /// queued for persistence only once the answer is complete.
    #[instrument(skip(self, question, handler), fields(model = self.model.model_name()))]
    pub async fn answer(
        &self,
        session_id: &str,
        question: &str,
        k: Option<usize>,
        handler: &mut dyn StreamHandler,
    ) -> Result<ChatResponse, ServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        if k == Some(0) {
            return Err(ServiceError::InvalidInput("k must be at least 1".to_string()));
        }

        if self.storage.get_session(session_id)?.is_none() {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        let history = self.storage.get_messages(session_id)?;

        let mut state = match self.session_store.get(session_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load retrieval state, starting fresh");
                Default::default()
            }
        };
        state.conversation_length = history.len();

        let augmented = self
            .orchestrator
            .augment(session_id, question, state, k)
            .await?;

        if let Err(e) = self
            .session_store
            .put(session_id, &augmented.state, self.config.session_ttl)
            .await
        {
            warn!(session_id = %session_id, error = %e, "Failed to save retrieval state");
        }

        let messages = self.prompt.build(&augmented.context, &history, question);
        debug!(
            session_id = %session_id,
            prompt_messages = messages.len(),
            "Generating answer"
        );

        let answer = self
            .model
            .stream(&messages, self.config.answer_params, handler)
            .await?;

        self.persist
            .enqueue(StoredMessage::new(session_id, ChatRole::User, question));
        self.persist
            .enqueue(StoredMessage::new(session_id, ChatRole::Assistant, answer.as_str()));

        let used_web_search = augmented.used_web_search();
        info!(
            session_id = %session_id,
            reused_cache = augmented.decision.uses_cache(),
            used_web_search,
            answer_chars = answer.len(),
            "Answered question"
        );

        Ok(ChatResponse {
            answer,
            documents: augmented.documents,
            decision: augmented.decision,
            confidence: augmented.confidence,
            used_web_search,
        })
    }

    pub fn create_session(&self, title: &str) -> Result<Session, ServiceError> {
        let session = self.storage.create_session(title)?;
        info!(session_id = %session.session_id, "Created session");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, ServiceError> {
        self.storage
            .get_session(session_id)?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    /// Sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<Session>, ServiceError> {
        Ok(self.storage.list_sessions()?)
    }

    /// Persisted messages of a session in order.
    pub fn history(&self, session_id: &str) -> Result<Vec<StoredMessage>, ServiceError> {
        self.get_session(session_id)?;
        Ok(self.storage.get_messages(session_id)?)
    }

    /// Delete a session, its messages and its retrieval state.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.persist.flush().await;
        if !self.storage.delete_session(session_id)? {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        self.session_store.delete(session_id).await?;
        info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    /// Wait for queued message writes to be attempted.
    pub async fn flush(&self) {
        self.persist.flush().await;
    }

    /// Drain queued writes, stop the persistence worker and log its totals.
    pub async fn shutdown(self) -> Arc<PersistMetrics> {
        let metrics = self.persist.metrics();
        self.persist.shutdown().await;
        info!(
            written = metrics.written(),
            failed = metrics.failed(),
            "Chat service stopped"
        );
        metrics
    }
}
