//! Key encoding and decoding for storage layer.
//!
//! - `session:{session_id}`
//! - `msg:{session_id}:{seq:010}` (zero-padded so byte order is sequence order)
//! - `cache:{session_id}`

use crate::error::StorageError;

/// Reject ids that would break key parsing.
fn validate_session_id(session_id: &str) -> Result<(), StorageError> {
    if session_id.is_empty() {
        return Err(StorageError::Key("Empty session id".to_string()));
    }
    if session_id.contains(':') {
        return Err(StorageError::Key(format!(
            "Session id must not contain ':': {}",
            session_id
        )));
    }
    Ok(())
}

/// Key for session records
/// Format: session:{session_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub session_id: String,
}

impl SessionKey {
    pub fn new(session_id: &str) -> Result<Self, StorageError> {
        validate_session_id(session_id)?;
        Ok(Self {
            session_id: session_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("session:{}", self.session_id).into_bytes()
    }
}

/// Key for a conversation message
/// Format: msg:{session_id}:{seq:010}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKey {
    pub session_id: String,
    pub seq: u64,
}

impl MessageKey {
    pub fn new(session_id: &str, seq: u64) -> Result<Self, StorageError> {
        validate_session_id(session_id)?;
        Ok(Self {
            session_id: session_id.to_string(),
            seq,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("msg:{}:{:010}", self.session_id, self.seq).into_bytes()
    }

    /// Prefix shared by every message of a session.
    pub fn session_prefix(session_id: &str) -> Result<Vec<u8>, StorageError> {
        validate_session_id(session_id)?;
        Ok(format!("msg:{}:", session_id).into_bytes())
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "msg" {
            return Err(StorageError::Key(format!("Invalid message key format: {}", s)));
        }
        let seq: u64 = parts[2]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid sequence: {}", e)))?;
        Self::new(parts[1], seq)
    }
}

/// Key for cached retrieval state
/// Format: cache:{session_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub session_id: String,
}

impl CacheKey {
    pub fn new(session_id: &str) -> Result<Self, StorageError> {
        validate_session_id(session_id)?;
        Ok(Self {
            session_id: session_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("cache:{}", self.session_id).into_bytes()
    }
}
