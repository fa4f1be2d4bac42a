//! Document index: HNSW graph plus the documents behind its keys.
//!
//! On disk an index directory holds `hnsw.usearch` and a `documents`
//! RocksDB store recording each document and the build dimension/model.

use std::path::Path;
use tracing::{info, warn};

use rag_types::Document;

use crate::embedding::Embedding;
use crate::error::VectorError;
use crate::hnsw::{HnswConfig, HnswIndex, INDEX_FILE};
use crate::metadata::{DocumentStore, IndexInfo};

const DOCUMENTS_DIR: &str = "documents";

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Embedding model the vectors came from
    pub model: String,
}

/// Searchable documents with their embeddings.
pub struct DocumentIndex {
    hnsw: HnswIndex,
    documents: DocumentStore,
    info: IndexInfo,
}

impl DocumentIndex {
    /// Start an empty index at `path`, discarding any previous build.
    ///
    /// `capacity` is the expected document count; the graph grows past it.
    pub fn create(
        path: &Path,
        dimension: usize,
        model: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, VectorError> {
        if dimension == 0 {
            return Err(VectorError::InvalidInput(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let hnsw =
            HnswIndex::create(HnswConfig::new(dimension, path).with_capacity(capacity.max(1)))?;
        let documents = DocumentStore::open(path.join(DOCUMENTS_DIR))?;
        documents.clear()?;

        let info = IndexInfo {
            dimension,
            model: model.into(),
        };
        documents.set_info(&info)?;

        Ok(Self {
            hnsw,
            documents,
            info,
        })
    }

    /// Open a saved index; a directory without one is `VectorError::NotFound`.
    pub fn open(path: &Path) -> Result<Self, VectorError> {
        let index_file = path.join(INDEX_FILE);
        if !index_file.exists() {
            return Err(VectorError::NotFound(index_file));
        }
        let documents = DocumentStore::open(path.join(DOCUMENTS_DIR))?;
        let info = documents
            .info()?
            .ok_or_else(|| VectorError::NotFound(path.join(DOCUMENTS_DIR)))?;
        let hnsw = HnswIndex::open(HnswConfig::new(info.dimension, path))?;

        let stored = documents.count()?;
        if stored != hnsw.len() {
            warn!(
                vectors = hnsw.len(),
                documents = stored,
                "Vector and document counts differ"
            );
        }
        info!(path = ?path, vectors = hnsw.len(), model = %info.model, "Loaded document index");

        Ok(Self {
            hnsw,
            documents,
            info,
        })
    }

    pub fn len(&self) -> usize {
        self.hnsw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hnsw.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.info.dimension
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.hnsw.len(),
            dimension: self.info.dimension,
            model: self.info.model.clone(),
        }
    }

    /// Add a document; returns its vector ID.
    pub fn add(&self, document: &Document, embedding: &Embedding) -> Result<u64, VectorError> {
        let vector_id = self.documents.next_vector_id()?;
        self.hnsw.add(vector_id, embedding)?;
        self.documents.put(vector_id, document)?;
        Ok(vector_id)
    }

    /// Top-k documents by descending cosine similarity.
    pub fn search(
        &self,
        query: &Embedding,
        k: usize,
    ) -> Result<Vec<(Document, f32)>, VectorError> {
        let hits = self.hnsw.search(query, k)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.documents.get(hit.vector_id)? {
                Some(document) => results.push((document, hit.score)),
                None => warn!(vector_id = hit.vector_id, "Vector without stored document"),
            }
        }
        Ok(results)
    }

    /// Persist the graph; documents are durable as they are added.
    pub fn save(&self) -> Result<(), VectorError> {
        self.hnsw.save()
    }
}
