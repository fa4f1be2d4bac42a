//! # rag-websearch
//!
//! Web search collaborator used when the assembled context scores below the
//! confidence threshold.
//!
//! Results are validated at the boundary: a response item without a link is
//! a malformed response, not a silently dropped entry.

mod google;
mod mock;

pub use google::{GoogleSearchClient, GoogleSearchConfig};
pub use mock::MockWebSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rag_types::{Document, SOURCE_WEB_SEARCH};

/// Error type for web search calls.
#[derive(Debug, Error)]
pub enum WebSearchError {
    /// API key or engine id not configured
    #[error("Web search credentials are not configured")]
    MissingCredentials,

    /// Network failure, timeout or non-2xx status
    #[error("Web search unavailable: {0}")]
    Unavailable(String),

    /// Response body did not match the expected schema
    #[error("Malformed web search response: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

impl WebResult {
    pub fn new(
        title: impl Into<String>,
        snippet: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            snippet: snippet.into(),
            link: link.into(),
        }
    }

    /// Convert into a context document tagged `web_search`.
    pub fn into_document(self) -> Document {
        Document::new(format!("{}\n{}", self.title, self.snippet))
            .with_source(SOURCE_WEB_SEARCH)
            .with_metadata("title", self.title)
            .with_metadata("link", self.link)
    }
}

/// Pluggable web search provider.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web, returning at most `limit` results in rank order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, WebSearchError>;

    /// Provider name for logging.
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_document() {
        let doc = WebResult::new("Election results", "Candidate A won.", "https://news.example/a")
            .into_document();

        assert_eq!(doc.content, "Election results\nCandidate A won.");
        assert!(doc.is_web_result());
        assert_eq!(doc.metadata["title"], "Election results");
        assert_eq!(doc.metadata["link"], "https://news.example/a");
    }
}
