//! RocksDB wrapper for chat storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Session records and append-only message logs
//! - Per-session retrieval state with TTL expiry
//! - Atomic session deletion via WriteBatch

use chrono::Utc;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use rag_types::{now_ms, Session, SessionRetrievalState, StoredMessage};

use crate::column_families::{
    build_cf_descriptors, CF_MESSAGES, CF_RETRIEVAL_CACHE, CF_SESSIONS,
};
use crate::error::StorageError;
use crate::keys::{CacheKey, MessageKey, SessionKey};

/// Retrieval state plus its expiry instant.
#[derive(Debug, Serialize, Deserialize)]
struct CachedState {
    expires_at_ms: i64,
    state: SessionRetrievalState,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub session_count: u64,
    pub message_count: u64,
    pub cached_state_count: u64,
}

/// Main storage interface for the chat backend
pub struct Storage {
    db: DB,
    /// Serializes sequence assignment in `append_message`
    append_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;

        Ok(Self {
            db,
            append_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Sessions ====================

    /// Create and persist a new session.
    pub fn create_session(&self, title: &str) -> Result<Session, StorageError> {
        let session = Session::new(title);
        self.put_session(&session)?;
        debug!(session_id = %session.session_id, "Created session");
        Ok(session)
    }

    /// Insert or overwrite a session record.
    pub fn put_session(&self, session: &Session) -> Result<(), StorageError> {
        let cf = self.cf(CF_SESSIONS)?;
        let key = SessionKey::new(&session.session_id)?;
        self.db.put_cf(cf, key.to_bytes(), session.to_bytes()?)?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        let cf = self.cf(CF_SESSIONS)?;
        let key = SessionKey::new(session_id)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(Session::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All sessions, most recently updated first.
    pub fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let cf = self.cf(CF_SESSIONS)?;
        let mut sessions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            sessions.push(Session::from_bytes(&value)?);
        }
        sessions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.session_id.cmp(&a.session_id))
        });
        Ok(sessions)
    }

    /// Delete a session, its messages and its retrieval state atomically.
    ///
    /// Returns false if the session did not exist.
    pub fn delete_session(&self, session_id: &str) -> Result<bool, StorageError> {
        let sessions_cf = self.cf(CF_SESSIONS)?;
        let messages_cf = self.cf(CF_MESSAGES)?;
        let cache_cf = self.cf(CF_RETRIEVAL_CACHE)?;

        let session_key = SessionKey::new(session_id)?.to_bytes();
        if self.db.get_cf(sessions_cf, &session_key)?.is_none() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(sessions_cf, &session_key);
        batch.delete_cf(cache_cf, CacheKey::new(session_id)?.to_bytes());

        let prefix = MessageKey::session_prefix(session_id)?;
        let mut removed = 0usize;
        for item in self
            .db
            .iterator_cf(messages_cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(messages_cf, key);
            removed += 1;
        }

        self.db.write(batch)?;
        info!(session_id = %session_id, messages = removed, "Deleted session");
        Ok(true)
    }

    // ==================== Messages ====================

    /// Append a message, assigning the next sequence number.
    ///
    /// Also bumps the session's `updated_at` in the same batch.
    pub fn append_message(&self, mut message: StoredMessage) -> Result<StoredMessage, StorageError> {
        let messages_cf = self.cf(CF_MESSAGES)?;
        let sessions_cf = self.cf(CF_SESSIONS)?;

        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| StorageError::Lock("append lock poisoned".to_string()))?;

        let mut session = self
            .get_session(&message.session_id)?
            .ok_or_else(|| StorageError::SessionNotFound(message.session_id.clone()))?;

        message.seq = self.message_count(&message.session_id)? as u64;
        let key = MessageKey::new(&message.session_id, message.seq)?;
        session.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        batch.put_cf(messages_cf, key.to_bytes(), message.to_bytes()?);
        batch.put_cf(
            sessions_cf,
            SessionKey::new(&session.session_id)?.to_bytes(),
            session.to_bytes()?,
        );
        self.db.write(batch)?;

        debug!(
            session_id = %message.session_id,
            seq = message.seq,
            role = %message.role,
            "Appended message"
        );
        Ok(message)
    }

    /// Messages of a session in sequence order.
    pub fn get_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, StorageError> {
        let cf = self.cf(CF_MESSAGES)?;
        let prefix = MessageKey::session_prefix(session_id)?;

        let mut messages = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            messages.push(StoredMessage::from_bytes(&value)?);
        }
        Ok(messages)
    }

    /// Number of stored messages for a session.
    pub fn message_count(&self, session_id: &str) -> Result<usize, StorageError> {
        let cf = self.cf(CF_MESSAGES)?;
        let prefix = MessageKey::session_prefix(session_id)?;

        let mut count = 0;
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    // ==================== Retrieval cache ====================

    /// Store retrieval state, expiring after `ttl`.
    pub fn put_retrieval_state(
        &self,
        session_id: &str,
        state: &SessionRetrievalState,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_RETRIEVAL_CACHE)?;
        let key = CacheKey::new(session_id)?;
        let entry = CachedState {
            expires_at_ms: now_ms().saturating_add(ttl.as_millis() as i64),
            state: state.clone(),
        };
        self.db.put_cf(cf, key.to_bytes(), serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    /// Retrieval state, or None when absent or expired.
    ///
    /// Expired entries are deleted on read.
    pub fn get_retrieval_state(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRetrievalState>, StorageError> {
        let cf = self.cf(CF_RETRIEVAL_CACHE)?;
        let key = CacheKey::new(session_id)?.to_bytes();

        let Some(bytes) = self.db.get_cf(cf, &key)? else {
            return Ok(None);
        };
        let entry: CachedState = serde_json::from_slice(&bytes)?;
        if entry.expires_at_ms <= now_ms() {
            debug!(session_id = %session_id, "Retrieval state expired");
            self.db.delete_cf(cf, &key)?;
            return Ok(None);
        }
        Ok(Some(entry.state))
    }

    pub fn delete_retrieval_state(&self, session_id: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_RETRIEVAL_CACHE)?;
        self.db.delete_cf(cf, CacheKey::new(session_id)?.to_bytes())?;
        Ok(())
    }

    // ==================== Stats ====================

    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let count = |name: &str| -> Result<u64, StorageError> {
            let cf = self.cf(name)?;
            let mut n = 0;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                item?;
                n += 1;
            }
            Ok(n)
        };

        Ok(StorageStats {
            session_count: count(CF_SESSIONS)?,
            message_count: count(CF_MESSAGES)?,
            cached_state_count: count(CF_RETRIEVAL_CACHE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_families::ALL_CF_NAMES;
    use rag_types::{ChatRole, Document, RetrievalEpisode};
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn state_with_episode() -> SessionRetrievalState {
        let mut state = SessionRetrievalState::with_conversation_length(2);
        let episode =
            RetrievalEpisode::try_new("q", vec![Document::new("doc")], 2).unwrap();
        state.push_episode(episode, 5);
        state
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_create_and_get_session() {
        let (storage, _temp) = create_test_storage();
        let session = storage.create_session("Elections").unwrap();

        let loaded = storage.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(loaded, session);
        assert!(storage.get_session("01HN4QXKN6YWXVKZ3JMHP4BCDE").unwrap().is_none());
    }

    #[test]
    fn test_append_assigns_sequence() {
        let (storage, _temp) = create_test_storage();
        let session = storage.create_session("s").unwrap();
        let id = &session.session_id;

        for (i, text) in ["q1", "a1", "q2"].iter().enumerate() {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            let msg = storage
                .append_message(StoredMessage::new(id, role, *text))
                .unwrap();
            assert_eq!(msg.seq, i as u64);
        }

        let messages = storage.get_messages(id).unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2"]);
        assert_eq!(storage.message_count(id).unwrap(), 3);
    }

    #[test]
    fn test_append_to_missing_session_fails() {
        let (storage, _temp) = create_test_storage();
        let result = storage.append_message(StoredMessage::new("missing", ChatRole::User, "hi"));
        assert!(matches!(result, Err(StorageError::SessionNotFound(_))));
    }

    #[test]
    fn test_messages_are_isolated_per_session() {
        let (storage, _temp) = create_test_storage();
        let a = storage.create_session("a").unwrap();
        let b = storage.create_session("b").unwrap();

        storage
            .append_message(StoredMessage::new(&a.session_id, ChatRole::User, "for a"))
            .unwrap();
        storage
            .append_message(StoredMessage::new(&b.session_id, ChatRole::User, "for b"))
            .unwrap();

        assert_eq!(storage.get_messages(&a.session_id).unwrap().len(), 1);
        assert_eq!(storage.get_messages(&b.session_id).unwrap()[0].content, "for b");
    }

    #[test]
    fn test_list_sessions_newest_first() {
        let (storage, _temp) = create_test_storage();
        let older = storage.create_session("older").unwrap();
        let newer = storage.create_session("newer").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        storage
            .append_message(StoredMessage::new(&older.session_id, ChatRole::User, "bump"))
            .unwrap();

        let ids: Vec<_> = storage
            .list_sessions()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec![older.session_id, newer.session_id]);
    }

    #[test]
    fn test_delete_session_removes_everything() {
        let (storage, _temp) = create_test_storage();
        let session = storage.create_session("s").unwrap();
        let id = session.session_id.clone();
        storage
            .append_message(StoredMessage::new(&id, ChatRole::User, "hi"))
            .unwrap();
        storage
            .put_retrieval_state(&id, &state_with_episode(), Duration::from_secs(60))
            .unwrap();

        assert!(storage.delete_session(&id).unwrap());
        assert!(storage.get_session(&id).unwrap().is_none());
        assert_eq!(storage.message_count(&id).unwrap(), 0);
        assert!(storage.get_retrieval_state(&id).unwrap().is_none());
        assert!(!storage.delete_session(&id).unwrap());
    }

    #[test]
    fn test_retrieval_state_roundtrip() {
        let (storage, _temp) = create_test_storage();
        let state = state_with_episode();
        storage
            .put_retrieval_state("s1", &state, Duration::from_secs(60))
            .unwrap();
        assert_eq!(storage.get_retrieval_state("s1").unwrap(), Some(state));

        storage.delete_retrieval_state("s1").unwrap();
        assert!(storage.get_retrieval_state("s1").unwrap().is_none());
    }

    #[test]
    fn test_expired_retrieval_state_is_absent() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_retrieval_state("s1", &state_with_episode(), Duration::ZERO)
            .unwrap();
        assert!(storage.get_retrieval_state("s1").unwrap().is_none());
        assert_eq!(storage.get_stats().unwrap().cached_state_count, 0);
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = create_test_storage();
        let session = storage.create_session("s").unwrap();
        storage
            .append_message(StoredMessage::new(&session.session_id, ChatRole::User, "hi"))
            .unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(
            stats,
            StorageStats {
                session_count: 1,
                message_count: 1,
                cached_state_count: 0,
            }
        );
    }

    #[test]
    fn test_poisoned_append_lock_is_lock_error() {
        let (storage, _temp) = create_test_storage();
        let session = storage.create_session("s").unwrap();
        let storage = std::sync::Arc::new(storage);

        let holder = std::sync::Arc::clone(&storage);
        let joined = std::thread::spawn(move || {
            let _guard = holder.append_lock.lock().unwrap();
            panic!("writer died holding the append lock");
        })
        .join();
        assert!(joined.is_err());

        let err = storage
            .append_message(StoredMessage::new(&session.session_id, ChatRole::User, "hi"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Lock(_)));
        assert!(storage.get_messages(&session.session_id).unwrap().is_empty());
    }
}
