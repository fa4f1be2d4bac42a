//! Document storage for the vector index.
//!
//! Maps usearch keys (u64) to the indexed documents, plus the dimension
//! and embedding model the graph was built with. Stored in RocksDB next
//! to the graph file.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rag_types::Document;

use crate::error::VectorError;

/// Column family holding documents keyed by vector ID
pub const CF_DOCUMENTS: &str = "documents";

/// Column family holding the index descriptor
pub const CF_INDEX_INFO: &str = "index_info";

const INFO_KEY: &[u8] = b"info";

/// Dimension and model recorded at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub dimension: usize,
    pub model: String,
}

/// Document metadata storage using RocksDB.
pub struct DocumentStore {
    db: DB,
}

impl DocumentStore {
    /// Open or create document storage.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_DOCUMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_INDEX_INFO, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        info!(path = ?path, "Opened document storage");
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VectorError::Index(format!("Column family not found: {}", name)))
    }

    pub fn put(&self, vector_id: u64, document: &Document) -> Result<(), VectorError> {
        let value = serde_json::to_vec(document)?;
        self.db
            .put_cf(self.cf(CF_DOCUMENTS)?, vector_id.to_be_bytes(), value)?;
        debug!(vector_id, "Stored document");
        Ok(())
    }

    pub fn get(&self, vector_id: u64) -> Result<Option<Document>, VectorError> {
        match self
            .db
            .get_cf(self.cf(CF_DOCUMENTS)?, vector_id.to_be_bytes())?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<usize, VectorError> {
        let iter = self
            .db
            .iterator_cf(self.cf(CF_DOCUMENTS)?, IteratorMode::Start);
        Ok(iter.count())
    }

    pub fn info(&self) -> Result<Option<IndexInfo>, VectorError> {
        match self.db.get_cf(self.cf(CF_INDEX_INFO)?, INFO_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_info(&self, info: &IndexInfo) -> Result<(), VectorError> {
        self.db
            .put_cf(self.cf(CF_INDEX_INFO)?, INFO_KEY, serde_json::to_vec(info)?)?;
        Ok(())
    }

    /// Remove all documents and the descriptor.
    ///
    /// Used before a full rebuild.
    pub fn clear(&self) -> Result<(), VectorError> {
        let mut batch = WriteBatch::default();
        for name in [CF_DOCUMENTS, CF_INDEX_INFO] {
            let cf = self.cf(name)?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (key, _) = item?;
                batch.delete_cf(cf, key);
            }
        }
        self.db.write(batch)?;
        debug!("Cleared document storage");
        Ok(())
    }

    /// Get the next available vector ID
    pub fn next_vector_id(&self) -> Result<u64, VectorError> {
        let mut iter = self.db.iterator_cf(self.cf(CF_DOCUMENTS)?, IteratorMode::End);

        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    VectorError::Index(format!("Malformed vector key of {} bytes", key.len()))
                })?;
                Ok(u64::from_be_bytes(bytes) + 1)
            }
            None => Ok(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        let mut doc = Document::new("Turnout was high in the election");
        doc.metadata.insert("title".to_string(), "Turnout".into());
        store.put(1, &doc).unwrap();

        assert_eq!(store.get(1).unwrap(), Some(doc));
        assert!(store.get(2).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_next_vector_id() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        assert_eq!(store.next_vector_id().unwrap(), 1);

        store.put(1, &Document::new("a")).unwrap();
        store.put(300, &Document::new("b")).unwrap();
        assert_eq!(store.next_vector_id().unwrap(), 301);
    }

    #[test]
    fn test_clear_removes_documents_and_info() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        store.put(1, &Document::new("a")).unwrap();
        store
            .set_info(&IndexInfo {
                dimension: 4,
                model: "hash".to_string(),
            })
            .unwrap();

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.info().unwrap().is_none());
        assert_eq!(store.next_vector_id().unwrap(), 1);
    }

    #[test]
    fn test_info_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let info = IndexInfo {
            dimension: 16,
            model: "text-embedding-3-small".to_string(),
        };
        {
            let store = DocumentStore::open(temp.path()).unwrap();
            store.set_info(&info).unwrap();
        }
        let store = DocumentStore::open(temp.path()).unwrap();
        assert_eq!(store.info().unwrap(), Some(info));
    }
}
