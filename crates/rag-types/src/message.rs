//! Conversation types: chat messages, stored messages and sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of the message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// System instruction
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message sent to the conversational model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// A conversation message persisted for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique identifier (ULID string)
    pub message_id: String,

    /// Session this message belongs to
    pub session_id: String,

    /// Position in the session (0-based, assigned by storage)
    pub seq: u64,

    pub role: ChatRole,

    pub content: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Additional metadata (retrieval reason, web search flag, etc.)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StoredMessage {
    /// Create a message stamped now with a fresh ULID.
    ///
    /// `seq` is assigned by storage on append.
    pub fn new(session_id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            message_id: ulid::Ulid::new().to_string(),
            session_id: session_id.into(),
            seq: 0,
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Convert into a model-facing chat message.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (ULID string)
    pub session_id: String,

    pub title: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with a fresh ULID.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: ulid::Ulid::new().to_string(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert!(json.contains("\"assistant\""));
    }

    #[test]
    fn test_stored_message_to_chat_message() {
        let msg = StoredMessage::new("session-1", ChatRole::User, "What is Rust?");
        let chat = msg.to_chat_message();
        assert_eq!(chat, ChatMessage::user("What is Rust?"));
        assert_eq!(msg.message_id.len(), 26);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::new("a");
        let b = Session::new("b");
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.created_at, a.updated_at);
    }
}
