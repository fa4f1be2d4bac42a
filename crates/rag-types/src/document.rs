//! Document type: a unit of retrievable context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Metadata key holding the provenance tag of a document.
pub const SOURCE_KEY: &str = "source";

/// Provenance tag for documents returned by the vector index.
pub const SOURCE_VECTOR: &str = "vector";

/// Provenance tag for documents built from web search results.
pub const SOURCE_WEB_SEARCH: &str = "web_search";

/// A unit of retrievable context.
///
/// Documents are immutable once created: the content is what the model
/// sees, the metadata carries source identifiers, titles and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Text passed to the model
    pub content: String,

    /// Opaque metadata (source id, title, provenance tag)
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag the document with a provenance source.
    pub fn with_source(self, source: &str) -> Self {
        self.with_metadata(SOURCE_KEY, source)
    }

    /// Provenance tag, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    /// True when this document came from web search.
    pub fn is_web_result(&self) -> bool {
        self.source() == Some(SOURCE_WEB_SEARCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tag() {
        let doc = Document::new("text").with_source(SOURCE_WEB_SEARCH);
        assert_eq!(doc.source(), Some("web_search"));
        assert!(doc.is_web_result());

        let doc = Document::new("text").with_source(SOURCE_VECTOR);
        assert!(!doc.is_web_result());
    }

    #[test]
    fn test_metadata_defaults_when_missing() {
        let doc: Document = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(doc.content, "hello");
        assert!(doc.metadata.is_empty());
        assert!(doc.source().is_none());
    }

    #[test]
    fn test_non_string_metadata_is_preserved() {
        let doc = Document::new("text").with_metadata("page", 3);
        assert_eq!(doc.metadata["page"], Value::from(3));
        assert!(doc.source().is_none());
    }
}
