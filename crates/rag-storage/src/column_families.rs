//! Column family definitions for RocksDB.
//!
//! - sessions: session records (default compaction)
//! - messages: append-only conversation messages (Zstd compressed)
//! - retrieval_cache: per-session retrieval state with expiry

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for session records
pub const CF_SESSIONS: &str = "sessions";

/// Column family name for conversation messages
pub const CF_MESSAGES: &str = "messages";

/// Column family name for cached retrieval state
pub const CF_RETRIEVAL_CACHE: &str = "retrieval_cache";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_SESSIONS, CF_MESSAGES, CF_RETRIEVAL_CACHE];

fn messages_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_SESSIONS, Options::default()),
        ColumnFamilyDescriptor::new(CF_MESSAGES, messages_options()),
        ColumnFamilyDescriptor::new(CF_RETRIEVAL_CACHE, Options::default()),
    ]
}
