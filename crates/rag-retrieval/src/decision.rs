//! Retrieval decision engine.
//!
//! Decides per query whether a cached episode can be reused or new
//! documents must be retrieved. Retrieval is the default; reuse requires a
//! fresh episode whose context scores strictly above the threshold.

use std::sync::Arc;
use tracing::{debug, info};

use rag_types::{
    Document, RetrievalDecision, RetrievalSettings, SessionRetrievalState, STALENESS_MS,
};

use crate::assessor::Assessor;

/// Thresholds used by the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionConfig {
    pub confidence_threshold: f32,

    /// Episodes more than this many turns old are skipped.
    pub max_context_age: usize,
}

impl DecisionConfig {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            max_context_age: settings.max_context_age,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}

/// Greedy best-of-N cache lookup over a session's episodes.
pub struct DecisionEngine {
    assessor: Arc<dyn Assessor>,
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(assessor: Arc<dyn Assessor>, config: DecisionConfig) -> Self {
        Self { assessor, config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Decide with an explicit "now" (ms since epoch).
    ///
    /// Episodes older than [`STALENESS_MS`] or `max_context_age` turns are
    /// skipped; the rest are assessed one at a time in insertion order.
    pub async fn decide_at(
        &self,
        query: &str,
        state: &SessionRetrievalState,
        now_ms: i64,
    ) -> RetrievalDecision {
        let mut best: Option<(f32, &[Document], usize)> = None;

        for (i, episode) in state.episodes.iter().enumerate() {
            let age_turns = episode.age_in_turns(state.conversation_length);
            let age_ms = episode.age_ms(now_ms);

            if age_turns > self.config.max_context_age || age_ms > STALENESS_MS {
                debug!(
                    episode = i,
                    age_turns,
                    age_ms,
                    "Skipping stale episode"
                );
                continue;
            }

            let assessment = self.assessor.assess(query, &episode.context()).await;
            debug!(episode = i, score = assessment.score, "Scored cached episode");

            let better = match best {
                Some((best_score, _, _)) => assessment.score > best_score,
                None => true,
            };
            if better {
                best = Some((assessment.score, episode.documents.as_slice(), age_turns));
            }
        }

        match best {
            Some((score, documents, age)) if score > self.config.confidence_threshold => {
                info!(score, cache_age_turns = age, "Reusing cached retrieval");
                RetrievalDecision::reuse(documents.to_vec(), score, age)
            }
            _ => RetrievalDecision::retrieve_new(),
        }
    }
}
