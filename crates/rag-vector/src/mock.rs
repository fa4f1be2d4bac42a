//! Deterministic test doubles for embedding and search.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rag_types::{Document, SOURCE_VECTOR};

use crate::embedding::{Embedder, Embedding};
use crate::error::VectorError;
use crate::search::{ScoredDocument, VectorSearch};

/// Bag-of-words embedder hashing lowercase tokens into buckets.
///
/// Texts sharing words get positive similarity; no network access.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, VectorError> {
        let mut values = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            values[bucket] += 1.0;
        }
        Ok(Embedding::new(values))
    }
}

/// Vector search returning a fixed document list.
pub struct MockVectorSearch {
    documents: Vec<Document>,
    failing: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockVectorSearch {
    /// Documents are returned in order, truncated to `k`, tagged `vector`.
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            failing: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor from plain contents.
    pub fn with_contents<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(contents.into_iter().map(Document::new).collect())
    }

    /// A search that fails as if the index were not loaded.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Recorded `(query, k)` pairs.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((query.to_string(), k));
        }

        if self.failing {
            return Err(VectorError::Unavailable("mock index is not loaded".to_string()));
        }

        let count = self.documents.len().max(1) as f32;
        Ok(self
            .documents
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, doc)| ScoredDocument {
                document: doc.clone().with_source(SOURCE_VECTOR),
                score: 1.0 - i as f32 / count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("Hello world").await.unwrap();
        let b = embedder.embed("hello, WORLD").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_mock_search_truncates_and_counts() {
        let search = MockVectorSearch::with_contents(["a", "b", "c"]);
        let hits = search.similarity_search("q", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.content, "a");
        assert_eq!(search.call_count(), 1);
        assert_eq!(search.queries(), vec![("q".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let search = MockVectorSearch::failing();
        assert!(search.similarity_search("q", 5).await.is_err());
        assert_eq!(search.call_count(), 1);
    }
}
