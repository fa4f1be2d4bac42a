//! Augmentation orchestrator.
//!
//! Per request: decide, retrieve or reuse, render the context, re-assess,
//! and escalate to web search when the assembled context scores below the
//! threshold. At most one vector query and one web query run per request.

use std::sync::Arc;
use tracing::{debug, info, warn};

use rag_types::{
    now_ms, ConfidenceAssessment, Document, RetrievalDecision, RetrievalEpisode,
    RetrievalSettings, SessionRetrievalState,
};
use rag_vector::VectorSearch;
use rag_websearch::WebSearch;

use crate::assessor::Assessor;
use crate::context::{render_numbered, render_sectioned};
use crate::decision::{DecisionConfig, DecisionEngine};
use crate::RetrievalError;

/// Upper bound on web results merged into the context.
pub const MAX_WEB_RESULTS: usize = 5;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Shared by the cache-reuse gate and the web-search gate
    pub confidence_threshold: f32,
    pub max_context_age: usize,
    pub max_retrieval_history: usize,
    /// Default `k` for vector queries
    pub top_k: usize,
    pub web_search_results: usize,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            max_context_age: settings.max_context_age,
            max_retrieval_history: settings.max_retrieval_history,
            top_k: settings.top_k,
            web_search_results: settings.web_search_results,
        }
    }

    fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            confidence_threshold: self.confidence_threshold,
            max_context_age: self.max_context_age,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}

/// Result of augmenting one query.
#[derive(Debug, Clone)]
pub struct AugmentedContext {
    /// Context string for the answer prompt
    pub context: String,

    /// Final documents: web results first, then retrieved or cached ones
    pub documents: Vec<Document>,

    /// Updated retrieval state to persist
    pub state: SessionRetrievalState,

    pub decision: RetrievalDecision,

    /// Second-pass assessment of the assembled context
    pub confidence: ConfidenceAssessment,

    /// Number of web documents merged in
    pub web_results: usize,
}

impl AugmentedContext {
    pub fn used_web_search(&self) -> bool {
        self.web_results > 0
    }
}

/// Assembles context for a query from cache, vector index and web search.
pub struct AugmentationOrchestrator {
    decision_engine: DecisionEngine,
    assessor: Arc<dyn Assessor>,
    vector_search: Arc<dyn VectorSearch>,
    web_search: Option<Arc<dyn WebSearch>>,
    config: OrchestratorConfig,
}

impl AugmentationOrchestrator {
    /// The same assessor serves both the decision engine and the
    /// escalation gate. `web_search = None` disables escalation.
    pub fn new(
        assessor: Arc<dyn Assessor>,
        vector_search: Arc<dyn VectorSearch>,
        web_search: Option<Arc<dyn WebSearch>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            decision_engine: DecisionEngine::new(Arc::clone(&assessor), config.decision_config()),
            assessor,
            vector_search,
            web_search,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Augment a query against the current wall clock.
    ///
    /// `k` defaults to the configured `top_k`. Only a vector index failure
    /// is returned as an error.
    pub async fn augment(
        &self,
        session_id: &str,
        query: &str,
        state: SessionRetrievalState,
        k: Option<usize>,
    ) -> Result<AugmentedContext, RetrievalError> {
        self.augment_at(session_id, query, state, k, now_ms()).await
    }

    /// Augment with an explicit "now" (ms since epoch).
    pub async fn augment_at(
        &self,
        session_id: &str,
        query: &str,
        mut state: SessionRetrievalState,
        k: Option<usize>,
        now_ms: i64,
    ) -> Result<AugmentedContext, RetrievalError> {
        let k = k.unwrap_or(self.config.top_k);
        let decision = self.decision_engine.decide_at(query, &state, now_ms).await;
        debug!(
            session_id = %session_id,
            should_retrieve = decision.should_retrieve,
            reason = %decision.reason,
            "Retrieval decision"
        );

        let original: Vec<Document> = match (&decision.cached_documents, decision.should_retrieve) {
            (Some(cached), false) => cached.clone(),
            _ => {
                let hits = self.vector_search.similarity_search(query, k).await?;
                let documents: Vec<Document> = hits.into_iter().map(|h| h.document).collect();

                match RetrievalEpisode::try_new_at(
                    query,
                    documents.clone(),
                    state.conversation_length,
                    now_ms,
                ) {
                    Some(episode) => {
                        let evicted =
                            state.push_episode(episode, self.config.max_retrieval_history);
                        debug!(
                            session_id = %session_id,
                            documents = documents.len(),
                            evicted,
                            "Recorded retrieval episode"
                        );
                    }
                    None => debug!(session_id = %session_id, "Vector search returned no documents"),
                }
                documents
            }
        };

        let mut context = render_numbered(&original);
        let confidence = self.assessor.assess(query, &context).await;

        let mut documents = original;
        let mut web_results = 0;

        if confidence.score < self.config.confidence_threshold {
            let web_documents = self.search_web(session_id, query).await;
            if !web_documents.is_empty() {
                web_results = web_documents.len();
                context = render_sectioned(&web_documents, &documents);
                let mut merged = web_documents;
                merged.append(&mut documents);
                documents = merged;
            }
        }

        info!(
            session_id = %session_id,
            reused_cache = decision.uses_cache(),
            documents = documents.len(),
            web_results,
            confidence = confidence.score,
            "Context assembled"
        );

        Ok(AugmentedContext {
            context,
            documents,
            state,
            decision,
            confidence,
            web_results,
        })
    }

    /// Web documents for `query`; every failure reads as zero results.
    async fn search_web(&self, session_id: &str, query: &str) -> Vec<Document> {
        let Some(web_search) = &self.web_search else {
            debug!(session_id = %session_id, "Web search disabled");
            return Vec::new();
        };

        let limit = self.config.web_search_results.min(MAX_WEB_RESULTS);
        if limit == 0 {
            return Vec::new();
        }

        match web_search.search(query, limit).await {
            Ok(results) => results
                .into_iter()
                .take(limit)
                .map(|r| r.into_document())
                .collect(),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    provider = web_search.provider_name(),
                    error = %e,
                    "Web search failed, continuing without it"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessor::MockAssessor;
    use crate::context::{ORIGINAL_SECTION_HEADER, WEB_SECTION_HEADER};
    use rag_types::ConfidenceLevel;
    use rag_vector::MockVectorSearch;
    use rag_websearch::{MockWebSearch, WebResult};

    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        orchestrator: AugmentationOrchestrator,
        assessor: Arc<MockAssessor>,
        vector: Arc<MockVectorSearch>,
        web: Arc<MockWebSearch>,
    }

    fn fixture(assessor: MockAssessor, vector: MockVectorSearch, web: MockWebSearch) -> Fixture {
        let assessor = Arc::new(assessor);
        let vector = Arc::new(vector);
        let web = Arc::new(web);
        let orchestrator = AugmentationOrchestrator::new(
            assessor.clone(),
            vector.clone(),
            Some(web.clone()),
            OrchestratorConfig::default(),
        );
        Fixture {
            orchestrator,
            assessor,
            vector,
            web,
        }
    }

    fn web_results(n: usize) -> Vec<WebResult> {
        (0..n)
            .map(|i| WebResult::new(format!("News {}", i), "snippet", format!("https://n/{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_high_confidence_skips_web_search() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::High),
            MockVectorSearch::with_contents(["a", "b"]),
            MockWebSearch::new(web_results(2)),
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();

        assert_eq!(out.context, "Document 1: a\n\nDocument 2: b");
        assert_eq!(out.documents.len(), 2);
        assert!(!out.used_web_search());
        assert_eq!(f.web.call_count(), 0);
        assert_eq!(f.vector.queries(), vec![("q".to_string(), 5)]);

        assert_eq!(out.state.episodes.len(), 1);
        assert_eq!(out.state.episodes[0].timestamp_ms, NOW);
        assert_eq!(out.state.episodes[0].message_index, 0);
    }

    #[tokio::test]
    async fn test_low_confidence_prepends_web_results() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::Low),
            MockVectorSearch::with_contents(["a", "b", "c"]),
            MockWebSearch::new(web_results(2)),
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), Some(3), NOW)
            .await
            .unwrap();

        assert_eq!(out.web_results, 2);
        assert_eq!(out.documents.len(), 5);
        assert!(out.documents[..2].iter().all(|d| d.is_web_result()));
        assert!(out.documents[2..].iter().all(|d| !d.is_web_result()));
        assert!(out.context.starts_with(WEB_SECTION_HEADER));
        assert!(out.context.contains(ORIGINAL_SECTION_HEADER));
        assert_eq!(f.web.queries(), vec![("q".to_string(), MAX_WEB_RESULTS)]);

        // The cached episode keeps only the vector documents
        assert_eq!(out.state.episodes[0].documents.len(), 3);
    }

    #[tokio::test]
    async fn test_web_failure_keeps_existing_context() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::Low),
            MockVectorSearch::with_contents(["a"]),
            MockWebSearch::failing(),
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();

        assert_eq!(f.web.call_count(), 1);
        assert!(!out.used_web_search());
        assert_eq!(out.context, "Document 1: a");
    }

    #[tokio::test]
    async fn test_empty_web_results_keep_numbered_context() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::Low),
            MockVectorSearch::with_contents(["a"]),
            MockWebSearch::empty(),
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();
        assert!(!out.context.contains(WEB_SECTION_HEADER));
    }

    #[tokio::test]
    async fn test_vector_failure_is_surfaced() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::High),
            MockVectorSearch::failing(),
            MockWebSearch::empty(),
        );

        let result = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await;
        assert!(matches!(result, Err(RetrievalError::VectorSearch(_))));
    }

    #[tokio::test]
    async fn test_reuse_skips_vector_search() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::High),
            MockVectorSearch::with_contents(["fresh"]),
            MockWebSearch::empty(),
        );
        let mut state = SessionRetrievalState::with_conversation_length(2);
        state.push_episode(
            RetrievalEpisode::try_new_at("q", vec![Document::new("cached")], 0, NOW - 1_000)
                .unwrap(),
            5,
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", state, None, NOW)
            .await
            .unwrap();

        assert!(out.decision.uses_cache());
        assert_eq!(out.decision.cache_age_in_turns, 2);
        assert_eq!(f.vector.call_count(), 0);
        assert_eq!(out.documents, vec![Document::new("cached")]);
        assert_eq!(out.state.episodes.len(), 1);
        // one decision pass plus one escalation pass
        assert_eq!(f.assessor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_retrieval_records_no_episode() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::Low),
            MockVectorSearch::new(Vec::new()),
            MockWebSearch::new(web_results(1)),
        );

        let out = f
            .orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();

        assert!(out.state.is_empty());
        assert_eq!(out.documents.len(), 1);
        assert!(out.context.contains(ORIGINAL_SECTION_HEADER));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture(
            MockAssessor::new(ConfidenceLevel::High),
            MockVectorSearch::with_contents(["new"]),
            MockWebSearch::empty(),
        );
        let mut state = SessionRetrievalState::with_conversation_length(20);
        for i in 0..5 {
            // Too old to reuse, still occupying the history
            state.push_episode(
                RetrievalEpisode::try_new_at(format!("q{}", i), vec![Document::new("old")], i, NOW)
                    .unwrap(),
                5,
            );
        }

        let out = f
            .orchestrator
            .augment_at("s", "q", state, None, NOW)
            .await
            .unwrap();

        assert_eq!(out.state.episodes.len(), 5);
        assert_eq!(out.state.episodes[0].query, "q1");
        assert_eq!(out.state.latest().unwrap().message_index, 20);
    }

    #[tokio::test]
    async fn test_disabled_web_search() {
        let assessor = Arc::new(MockAssessor::new(ConfidenceLevel::Low));
        let orchestrator = AugmentationOrchestrator::new(
            assessor,
            Arc::new(MockVectorSearch::with_contents(["a"])),
            None,
            OrchestratorConfig::default(),
        );

        let out = orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();
        assert!(!out.used_web_search());
    }

    /// Provider that returns every result it has, whatever `limit` says.
    struct OverfullWebSearch {
        results: Vec<WebResult>,
        limits: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait::async_trait]
    impl WebSearch for OverfullWebSearch {
        async fn search(
            &self,
            _query: &str,
            limit: usize,
        ) -> Result<Vec<WebResult>, rag_websearch::WebSearchError> {
            self.limits.lock().unwrap().push(limit);
            Ok(self.results.clone())
        }

        fn provider_name(&self) -> &str {
            "overfull"
        }
    }

    #[tokio::test]
    async fn test_web_results_capped_at_five() {
        let web = Arc::new(OverfullWebSearch {
            results: web_results(8),
            limits: std::sync::Mutex::new(Vec::new()),
        });
        let orchestrator = AugmentationOrchestrator::new(
            Arc::new(MockAssessor::new(ConfidenceLevel::Low)),
            Arc::new(MockVectorSearch::with_contents(["a", "b"])),
            Some(web.clone()),
            OrchestratorConfig {
                web_search_results: 10,
                ..OrchestratorConfig::default()
            },
        );

        let out = orchestrator
            .augment_at("s", "q", SessionRetrievalState::new(), None, NOW)
            .await
            .unwrap();

        assert_eq!(*web.limits.lock().unwrap(), vec![MAX_WEB_RESULTS]);
        assert_eq!(out.web_results, 5);
        assert_eq!(out.documents.len(), 7);
        assert!(out.documents[..5].iter().all(|d| d.is_web_result()));
        let titles: Vec<_> = out.documents[..5]
            .iter()
            .map(|d| d.metadata["title"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["News 0", "News 1", "News 2", "News 3", "News 4"]);
        assert_eq!(out.documents[5].content, "a");
        assert_eq!(out.documents[6].content, "b");
        assert!(!out.context.contains("News 5"));
    }
}
