//! Storage layer for the chat backend.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for sessions, messages and retrieval state
//! - Sequence-ordered message keys for prefix scans
//! - Atomic session deletion via WriteBatch
//! - TTL-expiring per-session retrieval state behind [`SessionStore`]

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod store;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{CacheKey, MessageKey, SessionKey};
pub use store::{InMemorySessionStore, RocksSessionStore, SessionStore};
