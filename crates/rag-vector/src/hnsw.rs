//! HNSW index implementation using usearch.
//!
//! Parameters tuned for quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::embedding::Embedding;
use crate::error::VectorError;

/// File name of the serialized graph inside the index directory.
pub const INDEX_FILE: &str = "hnsw.usearch";

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match model)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Index directory
    pub index_path: PathBuf,
    /// Initial reservation; grows on demand
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize, index_path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            index_path: index_path.into(),
            capacity: 1024,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// One search hit: usearch key and cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub vector_id: u64,
    pub score: f32,
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
}

impl HnswIndex {
    /// Create an empty index, replacing any graph file already saved there.
    pub fn create(config: HnswConfig) -> Result<Self, VectorError> {
        std::fs::create_dir_all(&config.index_path)?;
        let index_file = config.index_path.join(INDEX_FILE);
        if index_file.exists() {
            std::fs::remove_file(&index_file)?;
        }

        info!(path = ?index_file, dim = config.dimension, "Creating new vector index");
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.capacity)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    /// Open a saved index; a missing graph file is `VectorError::NotFound`.
    pub fn open(config: HnswConfig) -> Result<Self, VectorError> {
        let index_file = config.index_path.join(INDEX_FILE);
        if !index_file.exists() {
            return Err(VectorError::NotFound(index_file));
        }

        info!(path = ?index_file, "Opening existing vector index");
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .load(path_str(&index_file)?)
            .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;
        if index.dimensions() != config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: config.dimension,
                actual: index.dimensions(),
            });
        }

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    fn index_file(&self) -> PathBuf {
        self.config.index_path.join(INDEX_FILE)
    }

    pub fn len(&self) -> usize {
        self.read().map(|index| index.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    pub fn add(&self, id: u64, embedding: &Embedding) -> Result<(), VectorError> {
        self.check_dimension(embedding)?;

        let index = self.write()?;
        if index.size() >= index.capacity() {
            let grown = (index.capacity() * 2).max(self.config.capacity);
            index
                .reserve(grown)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }
        index
            .add(id, &embedding.values)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(id = id, "Added vector");
        Ok(())
    }

    /// Top-`k` hits, best first.
    pub fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchHit>, VectorError> {
        self.check_dimension(query)?;

        let index = self.read()?;
        let results = index
            .search(&query.values, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let hits: Vec<SearchHit> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&vector_id, &dist)| SearchHit {
                vector_id,
                score: 1.0 - dist,
            })
            .collect();

        debug!(k = k, found = hits.len(), "Search complete");
        Ok(hits)
    }

    pub fn save(&self) -> Result<(), VectorError> {
        let index = self.read()?;
        let path = self.index_file();
        index
            .save(path_str(&path)?)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        info!(path = ?path, vectors = index.size(), "Saved vector index");
        Ok(())
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Index>, VectorError> {
        self.index
            .read()
            .map_err(|_| VectorError::Index("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Index>, VectorError> {
        self.index
            .write()
            .map_err(|_| VectorError::Index("index lock poisoned".to_string()))
    }
}

fn path_str(path: &Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))
}
