//! Vector index error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Index directory holds no saved index
    #[error("Index not found: {0}")]
    NotFound(PathBuf),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Document metadata storage error
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding service unreachable or returned a non-2xx status
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    /// Embedding response did not match the expected schema
    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
