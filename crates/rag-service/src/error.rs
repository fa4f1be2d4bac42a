//! Request-level error surface of the chat pipeline.

use thiserror::Error;

use rag_llm::LlmError;
use rag_retrieval::RetrievalError;
use rag_storage::StorageError;

/// Errors returned to callers of [`crate::ChatService`].
///
/// Assessor and web search failures never appear here; they degrade
/// inside the retrieval pipeline.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Vector index query failed
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Answer generation failed
    #[error("Answer generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
