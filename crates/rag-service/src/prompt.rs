//! Answer prompt assembly.

use tiktoken_rs::CoreBPE;

use rag_types::{ChatMessage, StoredMessage};

const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Answer the user's question \
using the context below. If the context does not contain the answer, say that you don't know.";

/// Token counter using cl100k, or ~4 chars per token if unavailable.
pub struct TokenCounter {
    bpe: Option<CoreBPE>,
}

impl TokenCounter {
    pub fn new() -> Self {
        let bpe = match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "cl100k tokenizer unavailable, estimating tokens");
                None
            }
        };
        Self { bpe }
    }

    /// Counter that always estimates.
    pub fn estimating() -> Self {
        Self { bpe: None }
    }

    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => (text.len() / 4).max(1),
        }
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the message list sent to the conversational model.
pub struct PromptBuilder {
    counter: TokenCounter,
    history_token_budget: usize,
}

impl PromptBuilder {
    pub fn new(counter: TokenCounter, history_token_budget: usize) -> Self {
        Self {
            counter,
            history_token_budget,
        }
    }

    /// System instruction with the context, then the newest history that
    /// fits the budget (in chronological order), then the question.
    pub fn build(
        &self,
        context: &str,
        history: &[StoredMessage],
        question: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\nContext:\n{}",
            SYSTEM_INSTRUCTION, context
        ))];
        messages.extend(self.select_history(history));
        messages.push(ChatMessage::user(question));
        messages
    }

    fn select_history(&self, history: &[StoredMessage]) -> Vec<ChatMessage> {
        let mut used = 0;
        let mut selected = Vec::new();
        for message in history.iter().rev() {
            let tokens = self.counter.count(&message.content);
            if used + tokens > self.history_token_budget {
                break;
            }
            used += tokens;
            selected.push(message.to_chat_message());
        }
        selected.reverse();
        selected
    }
}
