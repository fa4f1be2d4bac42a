//! Mock web search for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{WebResult, WebSearch, WebSearchError};

/// Mock web search returning fixed results.
pub struct MockWebSearch {
    results: Vec<WebResult>,
    failing: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockWebSearch {
    /// Create a mock returning `results` (truncated to the requested limit).
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            failing: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock returning no results.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Create a mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::empty()
        }
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recorded `(query, limit)` pairs.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, WebSearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query.to_string(), limit));
        }

        if self.failing {
            return Err(WebSearchError::Unavailable("mock search is failing".to_string()));
        }

        Ok(self.results.iter().take(limit).cloned().collect())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_truncates_to_limit() {
        let search = MockWebSearch::new(vec![
            WebResult::new("a", "a", "https://a"),
            WebResult::new("b", "b", "https://b"),
            WebResult::new("c", "c", "https://c"),
        ]);
        let results = search.search("q", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(search.call_count(), 1);
        assert_eq!(search.queries(), vec![("q".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let search = MockWebSearch::failing();
        assert!(search.search("q", 5).await.is_err());
    }
}
