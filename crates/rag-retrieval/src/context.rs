//! Context rendering for the answer prompt.

use rag_types::Document;

/// Section header for web search documents.
pub const WEB_SECTION_HEADER: &str = "[Web Search Results]";

/// Section header for documents from the vector index or the cache.
pub const ORIGINAL_SECTION_HEADER: &str = "[Original Retrieved Documents]";

/// Render documents as `Document N: ...` blocks, numbered from 1.
pub fn render_numbered(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}: {}", i + 1, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render web results and original documents as two labeled sections.
///
/// Numbering restarts in each section.
pub fn render_sectioned(web: &[Document], original: &[Document]) -> String {
    format!(
        "{}\n{}\n\n{}\n{}",
        WEB_SECTION_HEADER,
        render_numbered(web),
        ORIGINAL_SECTION_HEADER,
        render_numbered(original)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_numbered() {
        let docs = vec![Document::new("alpha"), Document::new("beta")];
        assert_eq!(render_numbered(&docs), "Document 1: alpha\n\nDocument 2: beta");
        assert_eq!(render_numbered(&[]), "");
    }

    #[test]
    fn test_render_sectioned() {
        let web = vec![Document::new("news")];
        let original = vec![Document::new("alpha"), Document::new("beta")];
        assert_eq!(
            render_sectioned(&web, &original),
            "[Web Search Results]\nDocument 1: news\n\n\
             [Original Retrieved Documents]\nDocument 1: alpha\n\nDocument 2: beta"
        );
    }
}
