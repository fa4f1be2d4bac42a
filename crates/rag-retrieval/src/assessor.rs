//! Confidence assessor with fail-open behavior.
//!
//! A language model labels how well a context answers a query as HIGH,
//! MEDIUM or LOW. The label is mapped to a score through the configured
//! table. Any failure of the underlying call yields MEDIUM; the assessor
//! never returns an error to its caller.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rag_llm::{ChatModel, CompletionParams};
use rag_types::{ChatMessage, ConfidenceAssessment, ConfidenceLevel, ConfidenceScores};

const ASSESSMENT_INSTRUCTION: &str = "You judge whether a context contains enough information \
to answer a question. Reply with exactly one word:\n\
HIGH - the context fully answers the question\n\
MEDIUM - the context partially answers the question\n\
LOW - the context does not answer the question";

/// Scores a query against a context.
#[async_trait]
pub trait Assessor: Send + Sync {
    async fn assess(&self, query: &str, context: &str) -> ConfidenceAssessment;
}

/// Counters for assessor outcomes.
#[derive(Debug, Default)]
pub struct AssessorMetrics {
    pub assessed: AtomicU64,
    pub fallbacks: AtomicU64,
}

impl AssessorMetrics {
    pub fn assessed(&self) -> u64 {
        self.assessed.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

/// Model-backed confidence assessor.
pub struct ConfidenceAssessor {
    model: Arc<dyn ChatModel>,
    scores: ConfidenceScores,
    metrics: Arc<AssessorMetrics>,
}

impl ConfidenceAssessor {
    pub fn new(model: Arc<dyn ChatModel>, scores: ConfidenceScores) -> Self {
        Self {
            model,
            scores,
            metrics: Arc::new(AssessorMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<AssessorMetrics> {
        Arc::clone(&self.metrics)
    }

    fn build_messages(query: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(ASSESSMENT_INSTRUCTION),
            ChatMessage::user(format!(
                "Context:\n{}\n\nQuestion: {}\n\nConfidence:",
                context, query
            )),
        ]
    }
}

#[async_trait]
impl Assessor for ConfidenceAssessor {
    async fn assess(&self, query: &str, context: &str) -> ConfidenceAssessment {
        let messages = Self::build_messages(query, context);

        match self
            .model
            .complete(&messages, CompletionParams::classifier())
            .await
        {
            Ok(raw) => {
                self.metrics.assessed.fetch_add(1, Ordering::Relaxed);
                let level = ConfidenceLevel::parse(&raw);
                if let ConfidenceLevel::Other(label) = &level {
                    tracing::debug!(label = %label, "Unrecognized confidence label, scoring as MEDIUM");
                }
                let assessment = ConfidenceAssessment::from_level(level, &self.scores);
                tracing::debug!(
                    level = %assessment.level,
                    score = assessment.score,
                    "Confidence assessed"
                );
                assessment
            }
            Err(e) => {
                self.metrics.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "Confidence assessment failed, defaulting to MEDIUM");
                ConfidenceAssessment::fallback(&self.scores)
            }
        }
    }
}

/// Rule-driven assessor for tests.
///
/// The first rule whose needle occurs in the context decides the result;
/// otherwise the default applies. Calls are recorded in order.
pub struct MockAssessor {
    rules: Vec<(String, ConfidenceAssessment)>,
    default: ConfidenceAssessment,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockAssessor {
    /// Assess every context at `level` under the default score table.
    pub fn new(level: ConfidenceLevel) -> Self {
        Self {
            rules: Vec::new(),
            default: ConfidenceAssessment::from_level(level, &ConfidenceScores::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Contexts containing `needle` get `level`.
    pub fn with_rule(self, needle: impl Into<String>, level: ConfidenceLevel) -> Self {
        let assessment = ConfidenceAssessment::from_level(level, &ConfidenceScores::default());
        self.with_assessment(needle, assessment)
    }

    /// Contexts containing `needle` get an explicit score.
    pub fn with_score(self, needle: impl Into<String>, score: f32) -> Self {
        let assessment = ConfidenceAssessment {
            level: ConfidenceLevel::Other(format!("SCORE_{:.2}", score)),
            score,
        };
        self.with_assessment(needle, assessment)
    }

    fn with_assessment(mut self, needle: impl Into<String>, assessment: ConfidenceAssessment) -> Self {
        self.rules.push((needle.into(), assessment));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Recorded `(query, context)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Assessor for MockAssessor {
    async fn assess(&self, query: &str, context: &str) -> ConfidenceAssessment {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((query.to_string(), context.to_string()));
        }
        self.rules
            .iter()
            .find(|(needle, _)| context.contains(needle.as_str()))
            .map(|(_, a)| a.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_llm::MockChatModel;

    fn assessor(model: MockChatModel) -> (ConfidenceAssessor, Arc<MockChatModel>) {
        let model = Arc::new(model);
        (
            ConfidenceAssessor::new(model.clone(), ConfidenceScores::default()),
            model,
        )
    }

    #[tokio::test]
    async fn test_maps_label_through_table() {
        let (assessor, _) = assessor(MockChatModel::new("x").with_replies([" high\n", "Low", "medium"]));

        let high = assessor.assess("q", "ctx").await;
        assert_eq!(high.level, ConfidenceLevel::High);
        assert!((high.score - 0.9).abs() < f32::EPSILON);

        let low = assessor.assess("q", "ctx").await;
        assert!((low.score - 0.4).abs() < f32::EPSILON);

        let medium = assessor.assess("q", "ctx").await;
        assert!((medium.score - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_unrecognized_label_scores_medium() {
        let (assessor, _) = assessor(MockChatModel::new("PROBABLY"));
        let result = assessor.assess("q", "ctx").await;
        assert_eq!(result.level, ConfidenceLevel::Other("PROBABLY".to_string()));
        assert!((result.score - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_model_failure_fails_open() {
        let (assessor, _) = assessor(MockChatModel::failing());
        let result = assessor.assess("q", "ctx").await;
        assert_eq!(result.level, ConfidenceLevel::Medium);
        assert!((result.score - 0.7).abs() < f32::EPSILON);
        assert_eq!(assessor.metrics().fallbacks(), 1);
        assert_eq!(assessor.metrics().assessed(), 0);
    }

    #[tokio::test]
    async fn test_identical_inputs_give_identical_assessments() {
        let (assessor, _) = assessor(MockChatModel::new("HIGH"));
        let first = assessor.assess("What is Rust?", "Rust is a language.").await;
        let second = assessor.assess("What is Rust?", "Rust is a language.").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_prompt_carries_query_and_context() {
        let (assessor, model) = assessor(MockChatModel::new("LOW"));
        assessor.assess("Who won?", "Document 1: results").await;

        let request = &model.requests()[0];
        assert_eq!(request.len(), 2);
        assert!(request[0].content.contains("HIGH"));
        assert!(request[1].content.contains("Who won?"));
        assert!(request[1].content.contains("Document 1: results"));
    }

    #[tokio::test]
    async fn test_mock_assessor_rules() {
        let mock = MockAssessor::new(ConfidenceLevel::Low)
            .with_score("alpha", 0.95)
            .with_rule("beta", ConfidenceLevel::High);

        assert!((mock.assess("q", "has alpha").await.score - 0.95).abs() < f32::EPSILON);
        assert_eq!(mock.assess("q", "has beta").await.level, ConfidenceLevel::High);
        assert_eq!(mock.assess("q", "neither").await.level, ConfidenceLevel::Low);
        assert_eq!(mock.call_count(), 3);
    }
}
