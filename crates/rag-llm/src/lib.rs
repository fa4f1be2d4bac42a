//! # rag-llm
//!
//! Conversational model collaborator for the chat backend.
//!
//! - [`ChatModel`]: pluggable async trait with a blocking-style `complete`
//!   and a callback-driven `stream`
//! - [`ApiChatModel`]: OpenAI- and Anthropic-compatible HTTP client
//! - [`MockChatModel`]: scripted model for tests
//!
//! Errors separate "collaborator unavailable" (network, timeout, non-2xx)
//! from "malformed collaborator response" (body failed schema validation).

mod api;
mod mock;
mod sse;

pub use api::{ApiChatModel, ApiChatModelConfig, ApiProvider};
pub use mock::MockChatModel;
pub use sse::SseDecoder;

use async_trait::async_trait;
use thiserror::Error;

use rag_types::ChatMessage;

/// Error type for model calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network failure, timeout or non-2xx status
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    /// Response body did not match the expected schema
    #[error("Malformed model response: {0}")]
    Malformed(String),

    /// Response was well-formed but carried no text
    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LlmError {
    /// True for transport-level failures (as opposed to bad payloads).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LlmError::Unavailable(_) | LlmError::RateLimited)
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Parameters for single-word classification prompts.
    pub fn classifier() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 5,
        }
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Receives streamed output.
///
/// `on_token` fires zero or more times, then exactly one of
/// `on_complete` (with the full text) or `on_error`.
pub trait StreamHandler: Send {
    fn on_token(&mut self, token: &str);

    fn on_complete(&mut self, full_text: &str);

    fn on_error(&mut self, error: &LlmError);
}

/// Handler that only accumulates the streamed text.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    pub tokens: Vec<String>,
    pub completed: Option<String>,
    pub error: Option<String>,
}

impl StreamHandler for CollectingHandler {
    fn on_token(&mut self, token: &str) {
        self.tokens.push(token.to_string());
    }

    fn on_complete(&mut self, full_text: &str) {
        self.completed = Some(full_text.to_string());
    }

    fn on_error(&mut self, error: &LlmError) {
        self.error = Some(error.to_string());
    }
}

/// Pluggable conversational model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a conversation and return the assistant text.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, LlmError>;

    /// Stream a completion through `handler`, returning the full text.
    ///
    /// The default implementation completes non-incrementally and emits
    /// the whole answer as a single token.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: CompletionParams,
        handler: &mut dyn StreamHandler,
    ) -> Result<String, LlmError> {
        match self.complete(messages, params).await {
            Ok(text) => {
                handler.on_token(&text);
                handler.on_complete(&text);
                Ok(text)
            }
            Err(e) => {
                handler.on_error(&e);
                Err(e)
            }
        }
    }

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel(Result<&'static str, ()>);

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: CompletionParams,
        ) -> Result<String, LlmError> {
            self.0
                .map(str::to_string)
                .map_err(|_| LlmError::Unavailable("down".to_string()))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_default_stream_emits_single_token_then_complete() {
        let model = FixedModel(Ok("hello world"));
        let mut handler = CollectingHandler::default();

        let text = model
            .stream(&[ChatMessage::user("hi")], CompletionParams::default(), &mut handler)
            .await
            .unwrap();

        assert_eq!(text, "hello world");
        assert_eq!(handler.tokens, vec!["hello world"]);
        assert_eq!(handler.completed.as_deref(), Some("hello world"));
        assert!(handler.error.is_none());
    }

    #[tokio::test]
    async fn test_default_stream_reports_error_once() {
        let model = FixedModel(Err(()));
        let mut handler = CollectingHandler::default();

        let result = model
            .stream(&[ChatMessage::user("hi")], CompletionParams::default(), &mut handler)
            .await;

        assert!(result.is_err());
        assert!(handler.tokens.is_empty());
        assert!(handler.completed.is_none());
        assert!(handler.error.unwrap().contains("down"));
    }

    #[test]
    fn test_error_classification() {
        assert!(LlmError::Unavailable("x".into()).is_unavailable());
        assert!(LlmError::RateLimited.is_unavailable());
        assert!(!LlmError::Malformed("x".into()).is_unavailable());
        assert!(!LlmError::EmptyResponse.is_unavailable());
    }

    #[test]
    fn test_classifier_params() {
        let params = CompletionParams::classifier();
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.max_tokens, 5);
    }
}
