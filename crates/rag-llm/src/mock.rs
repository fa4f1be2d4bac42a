//! Mock chat model for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rag_types::ChatMessage;

use crate::{ChatModel, CompletionParams, LlmError, StreamHandler};

type Responder = dyn Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync;

/// Mock chat model with scripted replies.
///
/// Replies are taken from a queue first, then from the responder closure,
/// then from the fixed fallback reply. Every request is recorded.
pub struct MockChatModel {
    replies: Mutex<VecDeque<String>>,
    responder: Option<Arc<Responder>>,
    fallback: String,
    failing: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatModel {
    /// Create a mock that always answers `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            responder: None,
            fallback: fallback.into(),
            failing: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue replies returned in order before the fallback.
    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.replies.lock() {
            queue.extend(replies.into_iter().map(Into::into));
        }
        self
    }

    /// Answer with a closure over the request messages.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Create a mock whose every call fails as unavailable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new("")
        }
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages of every recorded request.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }

        if self.failing {
            return Err(LlmError::Unavailable("mock model is failing".to_string()));
        }

        if let Some(reply) = self.replies.lock().ok().and_then(|mut q| q.pop_front()) {
            return Ok(reply);
        }

        match &self.responder {
            Some(responder) => responder(messages),
            None => Ok(self.fallback.clone()),
        }
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new("This is a mock answer.")
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: CompletionParams,
    ) -> Result<String, LlmError> {
        self.next_reply(messages)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        _params: CompletionParams,
        handler: &mut dyn StreamHandler,
    ) -> Result<String, LlmError> {
        match self.next_reply(messages) {
            Ok(text) => {
                // Word-sized tokens, keeping whitespace attached
                for token in text.split_inclusive(' ') {
                    handler.on_token(token);
                }
                handler.on_complete(&text);
                Ok(text)
            }
            Err(e) => {
                handler.on_error(&e);
                Err(e)
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CollectingHandler;

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let model = MockChatModel::new("fallback").with_replies(["HIGH", "LOW"]);
        let msgs = [ChatMessage::user("q")];

        assert_eq!(model.complete(&msgs, CompletionParams::default()).await.unwrap(), "HIGH");
        assert_eq!(model.complete(&msgs, CompletionParams::default()).await.unwrap(), "LOW");
        assert_eq!(
            model.complete(&msgs, CompletionParams::default()).await.unwrap(),
            "fallback"
        );
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_responder_sees_messages() {
        let model = MockChatModel::default()
            .with_responder(|msgs| Ok(format!("echo: {}", msgs[0].content)));
        let reply = model
            .complete(&[ChatMessage::user("ping")], CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(reply, "echo: ping");
        assert_eq!(model.requests()[0][0].content, "ping");
    }

    #[tokio::test]
    async fn test_stream_splits_words() {
        let model = MockChatModel::new("one two three");
        let mut handler = CollectingHandler::default();
        let text = model
            .stream(&[ChatMessage::user("q")], CompletionParams::default(), &mut handler)
            .await
            .unwrap();
        assert_eq!(text, "one two three");
        assert_eq!(handler.tokens, vec!["one ", "two ", "three"]);
        assert_eq!(handler.tokens.concat(), text);
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = MockChatModel::failing();
        let mut handler = CollectingHandler::default();
        let result = model
            .stream(&[ChatMessage::user("q")], CompletionParams::default(), &mut handler)
            .await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
        assert!(handler.error.is_some());
        assert_eq!(model.call_count(), 1);
    }
}
