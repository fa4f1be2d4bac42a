//! # rag-types
//!
//! Shared domain types for the retrieval-augmented chat backend.
//!
//! This crate defines the data structures passed between the retrieval
//! core and its collaborators:
//! - Documents: units of retrievable context
//! - Retrieval episodes and the per-session retrieval state
//! - Confidence assessments and retrieval decisions
//! - Chat messages, stored messages and sessions
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use rag_types::{Document, SessionRetrievalState};
//!
//! let state = SessionRetrievalState::new();
//! assert!(state.episodes.is_empty());
//! let doc = Document::new("Rust 1.0 shipped in May 2015.");
//! assert!(doc.source().is_none());
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod message;
pub mod retrieval;

pub use config::{
    ConfidenceScores, EmbeddingSettings, LlmSettings, RetrievalSettings, Settings,
    WebSearchSettings, STALENESS_MS,
};
pub use document::{Document, SOURCE_KEY, SOURCE_VECTOR, SOURCE_WEB_SEARCH};
pub use error::RagError;
pub use message::{ChatMessage, ChatRole, Session, StoredMessage};
pub use retrieval::{
    now_ms, ConfidenceAssessment, ConfidenceLevel, RetrievalDecision, RetrievalEpisode,
    SessionRetrievalState, REASON_INITIAL_RETRIEVAL,
};
