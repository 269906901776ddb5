//! Documents submitted for validation
//!
//! A document is raw textual content. When the caller does not supply a
//! namespace, the namespace bound to the root element's prefix is detected
//! from the content itself.

use regex::Regex;
use std::sync::OnceLock;

/// Input to a validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id: Option<String>,
    content: String,
    namespace: Option<String>,
}

impl Document {
    /// Create a document, detecting its root namespace from the content
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let namespace = root_namespace(&content);
        Self { id: None, content, namespace }
    }

    /// Create a document with an explicitly supplied root namespace
    pub fn with_namespace(content: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { id: None, content: content.into(), namespace: Some(namespace.into()) }
    }

    /// Attach an identifier used in log lines
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Identifier for diagnostics, falling back to a placeholder
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<anonymous>")
    }
}

fn skipped_markup() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<\?.*?\?>|<!\[CDATA\[.*?\]\]>")
            .expect("static markup pattern is valid")
    })
}

fn root_element() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"<(?:([A-Za-z_][\w.\-]*):)?[A-Za-z_][\w.\-]*((?:\s+[^\s=>/]+\s*=\s*(?:"[^"]*"|'[^']*'))*)"#,
        )
        .expect("static root element pattern is valid")
    })
}

fn namespace_declaration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"xmlns(?::([\w.\-]+))?\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
            .expect("static namespace pattern is valid")
    })
}

/// Namespace URI bound to the prefix of the root element, if any.
///
/// Comments, processing instructions and CDATA sections ahead of the root
/// element are ignored. Only declarations on the root element itself count.
pub fn root_namespace(content: &str) -> Option<String> {
    let stripped = skipped_markup().replace_all(content, "");
    let root = root_element().captures(&stripped)?;
    let prefix = root.get(1).map(|m| m.as_str());
    let attributes = root.get(2).map_or("", |m| m.as_str());

    namespace_declaration().captures_iter(attributes).find_map(|decl| {
        let declared_prefix = decl.get(1).map(|m| m.as_str());
        if declared_prefix != prefix {
            return None;
        }
        decl.get(2).or_else(|| decl.get(3)).map(|uri| uri.as_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_namespace() {
        let xml = r#"<?xml version="1.0"?><record xmlns="urn:catalog:record"><title/></record>"#;
        assert_eq!(root_namespace(xml).as_deref(), Some("urn:catalog:record"));
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<dc:record xmlns="urn:other" xmlns:dc='http://purl.org/dc/elements/1.1/'>
            <dc:title>x</dc:title></dc:record>"#;
        assert_eq!(root_namespace(xml).as_deref(), Some("http://purl.org/dc/elements/1.1/"));
    }

    #[test]
    fn test_no_namespace() {
        assert_eq!(root_namespace("<record><title/></record>"), None);
        assert_eq!(root_namespace("plain text"), None);
        assert_eq!(root_namespace(""), None);
    }

    #[test]
    fn test_leading_comment_is_skipped() {
        let xml = r#"<!-- <fake xmlns="urn:wrong"> --><real xmlns="urn:right"/>"#;
        assert_eq!(root_namespace(xml).as_deref(), Some("urn:right"));
    }

    #[test]
    fn test_quoted_angle_bracket_before_declaration() {
        let xml = r#"<record note="a>b" xmlns="urn:catalog"><title></title></record>"#;
        assert_eq!(root_namespace(xml).as_deref(), Some("urn:catalog"));

        let xml = r#"<c:record c:hint='x > y' xmlns:c="urn:catalog"/>"#;
        assert_eq!(root_namespace(xml).as_deref(), Some("urn:catalog"));
    }

    #[test]
    fn test_nested_declarations_do_not_count() {
        let xml = r#"<record><inner xmlns="urn:inner"/></record>"#;
        assert_eq!(root_namespace(xml), None);
    }

    #[test]
    fn test_document_accessors() {
        let doc = Document::new(r#"<a xmlns="urn:a"/>"#).with_id("doc-1");
        assert_eq!(doc.namespace(), Some("urn:a"));
        assert_eq!(doc.id(), Some("doc-1"));
        assert!(!doc.is_empty());

        let explicit = Document::with_namespace("<a/>", "urn:explicit");
        assert_eq!(explicit.namespace(), Some("urn:explicit"));
        assert_eq!(explicit.display_id(), "<anonymous>");
    }
}
