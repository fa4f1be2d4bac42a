//! # rag-retrieval
//!
//! Retrieval decision and confidence-gated augmentation for the chat
//! backend.
//!
//! ## Core Concepts
//!
//! - **Episode**: a cached retrieval (query, documents, when it happened)
//! - **Decision**: reuse the best fresh episode or query the vector index
//! - **Confidence gate**: a model-labelled HIGH/MEDIUM/LOW score; failures
//!   fail open to MEDIUM
//! - **Augmentation**: web results prepended when the assembled context
//!   scores below the threshold
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = AugmentationOrchestrator::new(
//!     assessor,
//!     vector_search,
//!     Some(web_search),
//!     OrchestratorConfig::from_settings(&settings.retrieval),
//! );
//! let out = orchestrator.augment(&session_id, "Who won?", state, None).await?;
//! session_store.put(&session_id, &out.state, ttl).await?;
//! ```

pub mod assessor;
pub mod context;
pub mod decision;
pub mod orchestrator;

pub use assessor::{Assessor, AssessorMetrics, ConfidenceAssessor, MockAssessor};
pub use context::{render_numbered, render_sectioned, ORIGINAL_SECTION_HEADER, WEB_SECTION_HEADER};
pub use decision::{DecisionConfig, DecisionEngine};
pub use orchestrator::{
    AugmentationOrchestrator, AugmentedContext, OrchestratorConfig, MAX_WEB_RESULTS,
};

use thiserror::Error;

/// Request-level retrieval failures.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The vector index query failed; there is no fallback source
    #[error("Vector search failed: {0}")]
    VectorSearch(#[from] rag_vector::VectorError),
}
