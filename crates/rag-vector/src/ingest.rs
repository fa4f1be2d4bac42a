//! Build a document index from a JSONL corpus.
//!
//! Each line is `{"content": "...", "metadata": {...}}`. Blank lines are
//! skipped; documents with empty content are counted and dropped.

use std::io::BufRead;
use std::path::Path;
use tracing::{info, warn};

use rag_types::Document;

use crate::embedding::Embedder;
use crate::error::VectorError;
use crate::index::DocumentIndex;

/// Documents embedded per request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Ingestion statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub indexed: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Parse JSONL documents; a malformed line fails with its line number.
pub fn read_documents<R: BufRead>(reader: R) -> Result<Vec<Document>, VectorError> {
    let mut documents = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Document = serde_json::from_str(&line).map_err(|e| {
            VectorError::InvalidInput(format!("line {}: {}", line_no + 1, e))
        })?;
        documents.push(doc);
    }
    Ok(documents)
}

/// Embed `documents` in batches into a fresh index at `path`.
///
/// The first batch fixes the dimension. Any index already saved at `path`
/// is replaced.
pub async fn ingest_documents(
    path: &Path,
    embedder: &dyn Embedder,
    documents: Vec<Document>,
    batch_size: usize,
) -> Result<IngestStats, VectorError> {
    let mut stats = IngestStats::default();
    let (documents, empty): (Vec<Document>, Vec<Document>) = documents
        .into_iter()
        .partition(|d| !d.content.trim().is_empty());
    if !empty.is_empty() {
        warn!(count = empty.len(), "Skipping documents with empty content");
        stats.skipped = empty.len();
    }
    if documents.is_empty() {
        return Err(VectorError::InvalidInput(
            "corpus has no documents with content".to_string(),
        ));
    }

    let mut index: Option<DocumentIndex> = None;

    for chunk in documents.chunks(batch_size.max(1)) {
        let texts: Vec<String> = chunk.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunk.len() {
            return Err(VectorError::Malformed(format!(
                "expected {} embeddings, got {}",
                chunk.len(),
                embeddings.len()
            )));
        }
        if index.is_none() {
            let dimension = embeddings.first().map(|e| e.dimension()).unwrap_or(0);
            index = Some(DocumentIndex::create(
                path,
                dimension,
                embedder.model_name(),
                documents.len(),
            )?);
        }
        if let Some(index) = &index {
            for (doc, emb) in chunk.iter().zip(&embeddings) {
                index.add(doc, emb)?;
                stats.indexed += 1;
            }
        }
        stats.batches += 1;
    }

    if let Some(index) = index {
        index.save()?;
    }

    info!(
        indexed = stats.indexed,
        skipped = stats.skipped,
        batches = stats.batches,
        "Ingestion complete"
    );
    Ok(stats)
}
