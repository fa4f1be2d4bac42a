//! Session retrieval-state store.
//!
//! The decision pipeline reads a session's state at the start of a request
//! and writes it back at the end. There is no per-session locking: two
//! concurrent requests for one session race and the last write wins.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use rag_types::SessionRetrievalState;

use crate::db::Storage;
use crate::error::StorageError;

/// Key-value store for per-session retrieval state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// State for a session; an empty state when absent or expired.
    async fn get(&self, session_id: &str) -> Result<SessionRetrievalState, StorageError>;

    /// Replace the state, expiring after `ttl`.
    async fn put(
        &self,
        session_id: &str,
        state: &SessionRetrievalState,
        ttl: Duration,
    ) -> Result<(), StorageError>;

    async fn delete(&self, session_id: &str) -> Result<(), StorageError>;
}

/// Session store persisted in the RocksDB `retrieval_cache` column family.
pub struct RocksSessionStore {
    storage: Arc<Storage>,
}

impl RocksSessionStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SessionStore for RocksSessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionRetrievalState, StorageError> {
        Ok(self
            .storage
            .get_retrieval_state(session_id)?
            .unwrap_or_default())
    }

    async fn put(
        &self,
        session_id: &str,
        state: &SessionRetrievalState,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.storage.put_retrieval_state(session_id, state, ttl)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        self.storage.delete_retrieval_state(session_id)
    }
}

/// Process-local session store.
///
/// Owned by whoever constructs it and shared by handle; entries expire
/// lazily on read.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: DashMap<String, (Instant, SessionRetrievalState)>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and not-yet-collected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<SessionRetrievalState, StorageError> {
        let live = match self.entries.get(session_id) {
            Some(entry) if entry.0 > Instant::now() => Some(entry.1.clone()),
            Some(_) => None,
            None => return Ok(SessionRetrievalState::default()),
        };

        match live {
            Some(state) => Ok(state),
            None => {
                debug!(session_id = %session_id, "In-memory retrieval state expired");
                self.entries.remove(session_id);
                Ok(SessionRetrievalState::default())
            }
        }
    }

    async fn put(
        &self,
        session_id: &str,
        state: &SessionRetrievalState,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.entries.insert(
            session_id.to_string(),
            (Instant::now() + ttl, state.clone()),
        );
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        self.entries.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_types::{Document, RetrievalEpisode};
    use tempfile::TempDir;

    fn sample_state() -> SessionRetrievalState {
        let mut state = SessionRetrievalState::with_conversation_length(4);
        state.push_episode(
            RetrievalEpisode::try_new("q", vec![Document::new("d")], 4).unwrap(),
            5,
        );
        state
    }

    async fn exercise(store: &dyn SessionStore) {
        assert!(store.get("s1").await.unwrap().is_empty());

        let state = sample_state();
        store.put("s1", &state, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), state);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_empty());

        store.put("s2", &state, Duration::ZERO).await.unwrap();
        assert!(store.get("s2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySessionStore::new();
        exercise(&store).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_rocks_store() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let store = RocksSessionStore::new(storage);
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let store = InMemorySessionStore::new();
        let first = SessionRetrievalState::with_conversation_length(1);
        let second = SessionRetrievalState::with_conversation_length(2);
        store.put("s", &first, Duration::from_secs(60)).await.unwrap();
        store.put("s", &second, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("s").await.unwrap().conversation_length, 2);
    }
}
