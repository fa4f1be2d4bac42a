//! Embedding type and embedder trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Turns text into embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name recorded with the index.
    fn model_name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding, VectorError>;

    /// Embed a batch, preserving input order.
    /// Default implementation calls `embed()` for each text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, VectorError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_normalization() {
        let emb = Embedding::new(vec![3.0, 4.0]);
        assert!((emb.values[0] - 0.6).abs() < 0.001);
        assert!((emb.values[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        let emb = Embedding::new(vec![0.0, 0.0]);
        assert_eq!(emb.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let json = serde_json::to_string(&Embedding::new(vec![1.0, 0.0])).unwrap();
        assert_eq!(json, "[1.0,0.0]");
    }
}
