//! # rag-vector
//!
//! Vector index collaborator for the retrieval pipeline.
//!
//! - [`HnswIndex`]: usearch HNSW graph with cosine metric
//! - [`DocumentStore`]: RocksDB documents keyed by vector ID
//! - [`DocumentIndex`]: the two together in one index directory
//! - [`Embedder`] / [`ApiEmbedder`]: text to unit-length vectors
//! - [`VectorSearch`] / [`SemanticIndex`]: query-by-text top-k search
//! - [`ingest`]: corpus JSONL to index directory
//!
//! A missing index is reported as [`VectorError::NotFound`]; callers that
//! need retrieval treat it as fatal at startup.

pub mod api;
pub mod embedding;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod ingest;
pub mod metadata;
pub mod mock;
pub mod search;

pub use api::ApiEmbedder;
pub use embedding::{Embedder, Embedding};
pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex, SearchHit};
pub use index::{DocumentIndex, IndexStats};
pub use ingest::{ingest_documents, read_documents, IngestStats, DEFAULT_BATCH_SIZE};
pub use metadata::{DocumentStore, IndexInfo};
pub use mock::{HashEmbedder, MockVectorSearch};
pub use search::{ScoredDocument, SemanticIndex, VectorSearch};
