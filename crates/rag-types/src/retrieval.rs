//! Retrieval state types.
//!
//! - `RetrievalEpisode`: one past retrieval event within a session
//! - `SessionRetrievalState`: the bounded per-session episode list
//! - `ConfidenceLevel` / `ConfidenceAssessment`: output of the confidence gate
//! - `RetrievalDecision`: reuse cached documents or retrieve new ones

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfidenceScores;
use crate::document::Document;

/// Reason tag for the default "retrieve new" decision.
pub const REASON_INITIAL_RETRIEVAL: &str = "initial_retrieval";

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One cached retrieval event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalEpisode {
    /// Question that triggered the retrieval
    pub query: String,

    /// Documents returned at that time, in index order. Never empty.
    pub documents: Vec<Document>,

    /// Creation time (ms since epoch)
    pub timestamp_ms: i64,

    /// Conversation length when the retrieval happened
    pub message_index: usize,
}

impl RetrievalEpisode {
    /// Create an episode stamped with the current time.
    ///
    /// Returns `None` for an empty document list: empty retrievals are
    /// never cached as reusable episodes.
    pub fn try_new(
        query: impl Into<String>,
        documents: Vec<Document>,
        message_index: usize,
    ) -> Option<Self> {
        Self::try_new_at(query, documents, message_index, now_ms())
    }

    /// Create an episode with an explicit timestamp.
    pub fn try_new_at(
        query: impl Into<String>,
        documents: Vec<Document>,
        message_index: usize,
        timestamp_ms: i64,
    ) -> Option<Self> {
        if documents.is_empty() {
            return None;
        }
        Some(Self {
            query: query.into(),
            documents,
            timestamp_ms,
            message_index,
        })
    }

    /// Turns elapsed since this episode was recorded.
    pub fn age_in_turns(&self, conversation_length: usize) -> usize {
        conversation_length.saturating_sub(self.message_index)
    }

    /// Milliseconds elapsed since this episode was recorded.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }

    /// Episode context: document contents joined by a blank line.
    pub fn context(&self) -> String {
        self.documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Mutable per-session retrieval record, persisted between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRetrievalState {
    /// Episodes in chronological (insertion) order
    #[serde(default)]
    pub episodes: Vec<RetrievalEpisode>,

    /// Turns already recorded for the session
    #[serde(default)]
    pub conversation_length: usize,
}

impl SessionRetrievalState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty state at a given conversation length.
    pub fn with_conversation_length(conversation_length: usize) -> Self {
        Self {
            episodes: Vec::new(),
            conversation_length,
        }
    }

    /// Append an episode, evicting the oldest ones beyond `max_history`.
    ///
    /// Returns the number of evicted episodes.
    pub fn push_episode(&mut self, episode: RetrievalEpisode, max_history: usize) -> usize {
        self.episodes.push(episode);
        let overflow = self.episodes.len().saturating_sub(max_history);
        if overflow > 0 {
            self.episodes.drain(..overflow);
        }
        overflow
    }

    /// Check if no episodes are cached.
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Most recent episode.
    pub fn latest(&self) -> Option<&RetrievalEpisode> {
        self.episodes.last()
    }

    /// Serialize to JSON bytes for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Discrete confidence level returned by the classifier model.
///
/// HIGH, MEDIUM and LOW are the defaults; any other label is kept verbatim
/// and scored as MEDIUM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Other(String),
}

impl ConfidenceLevel {
    /// Parse a raw model label: trimmed and upper-cased before matching.
    pub fn parse(raw: &str) -> Self {
        let label = raw.trim().to_uppercase();
        match label.as_str() {
            "HIGH" => ConfidenceLevel::High,
            "MEDIUM" => ConfidenceLevel::Medium,
            "LOW" => ConfidenceLevel::Low,
            _ => ConfidenceLevel::Other(label),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Other(label) => label,
        }
    }
}

impl From<String> for ConfidenceLevel {
    fn from(value: String) -> Self {
        ConfidenceLevel::parse(&value)
    }
}

impl From<ConfidenceLevel> for String {
    fn from(value: ConfidenceLevel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of scoring a query against a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub level: ConfidenceLevel,

    /// Score in [0, 1], fixed by `level` under the configured table
    pub score: f32,
}

impl ConfidenceAssessment {
    /// Build an assessment, scoring the level through the table.
    pub fn from_level(level: ConfidenceLevel, scores: &ConfidenceScores) -> Self {
        let score = scores.score_for(&level);
        Self { level, score }
    }

    /// The fail-open default: MEDIUM at the table's medium score.
    pub fn fallback(scores: &ConfidenceScores) -> Self {
        Self::from_level(ConfidenceLevel::Medium, scores)
    }
}

/// Decision engine output for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDecision {
    pub should_retrieve: bool,

    /// Why the decision was made, e.g. `initial_retrieval` or
    /// `high_confidence_with_cache_0.90`
    pub reason: String,

    /// Documents of the reused episode (only when not retrieving)
    pub cached_documents: Option<Vec<Document>>,

    /// Age in turns of the reused episode (0 when not using the cache)
    pub cache_age_in_turns: usize,
}

impl RetrievalDecision {
    /// The default decision: retrieve new documents.
    pub fn retrieve_new() -> Self {
        Self {
            should_retrieve: true,
            reason: REASON_INITIAL_RETRIEVAL.to_string(),
            cached_documents: None,
            cache_age_in_turns: 0,
        }
    }

    /// Reuse a cached episode's documents.
    pub fn reuse(documents: Vec<Document>, confidence: f32, age_in_turns: usize) -> Self {
        Self {
            should_retrieve: false,
            reason: format!("high_confidence_with_cache_{:.2}", confidence),
            cached_documents: Some(documents),
            cache_age_in_turns: age_in_turns,
        }
    }

    /// True when the decision reuses cached documents.
    pub fn uses_cache(&self) -> bool {
        !self.should_retrieve && self.cached_documents.is_some()
    }
}

impl Default for RetrievalDecision {
    fn default() -> Self {
        Self::retrieve_new()
    }
}
