//! # rag-service
//!
//! The chat pipeline: load the session, augment the question with
//! retrieved (and possibly web) context, stream an answer from the
//! conversational model, then persist both turns in the background.
//!
//! ```rust,ignore
//! let service = ChatService::new(storage, session_store, orchestrator, model, config);
//! let session = service.create_session("elections")?;
//! let response = service
//!     .answer(&session.session_id, "What happened in the election?", None, &mut handler)
//!     .await?;
//! ```

pub mod error;
pub mod persist;
pub mod prompt;
pub mod service;

pub use error::ServiceError;
pub use persist::{PersistMetrics, PersistQueue};
pub use prompt::{PromptBuilder, TokenCounter};
pub use service::{ChatResponse, ChatService, ServiceConfig};
