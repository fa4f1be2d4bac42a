//! Similarity search over the document index.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use rag_types::{Document, SOURCE_KEY, SOURCE_VECTOR};

use crate::embedding::Embedder;
use crate::error::VectorError;
use crate::index::DocumentIndex;

/// A retrieved document with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Query-by-text similarity search.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Top-`k` documents for `query`, best first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorError>;
}

/// Document index paired with the embedder that built it.
pub struct SemanticIndex {
    index: DocumentIndex,
    embedder: Arc<dyn Embedder>,
}

impl SemanticIndex {
    pub fn new(index: DocumentIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Open the index saved in directory `path`.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, VectorError> {
        let index = DocumentIndex::open(path)?;
        if index.stats().model != embedder.model_name() {
            warn!(
                index_model = %index.stats().model,
                query_model = embedder.model_name(),
                "Index was built with a different embedding model"
            );
        }
        Ok(Self::new(index, embedder))
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }
}

#[async_trait]
impl VectorSearch for SemanticIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, VectorError> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_embedding, k)?;
        debug!(k, hits = hits.len(), "Vector search complete");

        Ok(hits
            .into_iter()
            .map(|(mut document, score)| {
                document
                    .metadata
                    .entry(SOURCE_KEY.to_string())
                    .or_insert_with(|| SOURCE_VECTOR.into());
                ScoredDocument { document, score }
            })
            .collect())
    }
}
