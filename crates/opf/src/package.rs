use crate::consts::{DC_NS, OPF_NS};
use crate::error::Result;
use crate::metadata::{Metadata, MetadataBlock};
use crate::xml::{Document, Element, Node};
use std::collections::HashSet;
use tracing::instrument;

/// A parsed package document, guaranteed to hold exactly one metadata block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageDocument {
    document: Document,
    /// Child-index path from the root to the metadata element.
    metadata: Vec<usize>,
}

impl PackageDocument {
    /// Parse a package document leniently.
    ///
    /// If no `metadata` element exists, an empty one is created as the first
    /// child of the root.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedXml`](crate::error::ErrorKind::MalformedXml) if not
    /// even a root element can be recovered.
    #[instrument(skip(bytes), fields(size = bytes.len()))]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut document = Document::parse(bytes)?;
        if document.root.local_name() != "package" {
            tracing::warn!(root = %document.root.name, "package document root is not <package>");
        }
        let metadata = match document.root.find_path(&is_metadata) {
            Some(path) => path,
            None => {
                tracing::warn!("package document has no metadata block, creating one");
                let opf = prefix_for(&[&document.root], OPF_NS);
                let element = Element::new(qualify(opf.as_ref(), "metadata"), opf.is_some().then_some(OPF_NS));
                document.root.children.insert(0, Node::Element(element));
                vec![0]
            },
        };
        Ok(Self { document, metadata })
    }

    /// A minimal EPUB 3 package: empty metadata, manifest and spine.
    pub fn minimal() -> Self {
        let mut root = Element::new("package", Some(OPF_NS))
            .with_attribute("xmlns", OPF_NS)
            .with_attribute("xmlns:dc", DC_NS)
            .with_attribute("version", "3.0")
            .with_attribute("unique-identifier", "BookId");
        for name in ["metadata", "manifest", "spine"] {
            root.push(Element::new(name, Some(OPF_NS)));
        }
        Self {
            document: Document::new(root),
            metadata: vec![0],
        }
    }

    /// Read-only view of the metadata block.
    pub fn metadata(&self) -> Metadata<'_> {
        Metadata::new(self.metadata_element())
    }

    /// Mutable view of the metadata block, for normalization.
    pub fn metadata_mut(&mut self) -> MetadataBlock<'_> {
        let chain = self.chain();
        let dc = prefix_for(&chain, DC_NS);
        let opf = prefix_for(&chain, OPF_NS);
        let mut ids = Vec::new();
        self.document.root.collect_attribute("id", &mut ids);
        MetadataBlock::new(self.metadata_element_mut(), dc, opf, ids.into_iter().collect())
    }

    /// Serialize back to UTF-8 bytes, with an XML declaration.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.document.to_bytes()
    }

    /// Root element, then each ancestor down to (and including) the metadata element.
    fn chain(&self) -> Vec<&Element> {
        let mut chain = vec![&self.document.root];
        let mut element = &self.document.root;
        for &index in &self.metadata {
            if let Some(Node::Element(child)) = element.children.get(index) {
                chain.push(child);
                element = child;
            }
        }
        chain
    }

    fn metadata_element(&self) -> &Element {
        self.chain().pop().unwrap_or(&self.document.root)
    }

    fn metadata_element_mut(&mut self) -> &mut Element {
        let mut element = &mut self.document.root;
        for &index in &self.metadata {
            // The path is fixed at construction and nothing above the
            // metadata block is ever restructured.
            element = element.child_mut(index).expect("metadata path points at an element");
        }
        element
    }
}

fn is_metadata(element: &Element) -> bool {
    element.local_name() == "metadata" && matches!(element.namespace.as_deref(), None | Some(OPF_NS))
}

/// The prefix bound to `uri` in scope at the end of `chain` (outermost first).
///
/// `Some(None)` means `uri` is the default namespace; `None` means it is not
/// bound at all.
pub(crate) fn prefix_for(chain: &[&Element], uri: &str) -> Option<Option<String>> {
    let mut shadowed = HashSet::new();
    for element in chain.iter().rev() {
        for (prefix, value) in element.namespace_declarations() {
            if shadowed.insert(prefix) && value == uri {
                return Some(prefix.map(str::to_string));
            }
        }
    }
    None
}

pub(crate) fn qualify(prefix: Option<&Option<String>>, local_name: &str) -> String {
    match prefix {
        Some(Some(prefix)) => format!("{prefix}:{local_name}"),
        _ => local_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_prefixed_metadata() {
        let document = PackageDocument::parse(
            br#"<opf:package xmlns:opf="http://www.idpf.org/2007/opf"><opf:metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">Walden</dc:title></opf:metadata></opf:package>"#,
        )
        .unwrap();
        assert_eq!(document.metadata().title().as_deref(), Some("Walden"));
    }

    #[test]
    fn creates_missing_metadata_block_first() {
        let mut document = PackageDocument::parse(
            br#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0"><manifest/><spine/></package>"#,
        )
        .unwrap();
        document.metadata_mut().ensure_field(crate::Field::Title, "Walden");
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.contains(r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0"><metadata"#));
        assert!(output.contains(">Walden</dc:title>"));
        let reparsed = PackageDocument::parse(output.as_bytes()).unwrap();
        assert_eq!(reparsed.metadata().title().as_deref(), Some("Walden"));
    }

    #[test]
    fn minimal_package_round_trips() {
        let bytes = PackageDocument::minimal().to_bytes().unwrap();
        let output = String::from_utf8(bytes.clone()).unwrap();
        assert!(output.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(output.contains(r#"unique-identifier="BookId""#));
        assert!(output.contains("<metadata/><manifest/><spine/>"));
        let reparsed = PackageDocument::parse(&bytes).unwrap();
        assert_eq!(reparsed.metadata().title(), None);
    }

    #[test]
    fn prefix_resolution_respects_shadowing() {
        let outer = Element::new("a", None).with_attribute("xmlns:x", "urn:one");
        let inner = Element::new("b", None).with_attribute("xmlns:x", "urn:two");
        assert_eq!(prefix_for(&[&outer, &inner], "urn:one"), None);
        assert_eq!(prefix_for(&[&outer, &inner], "urn:two"), Some(Some("x".to_string())));
        assert_eq!(prefix_for(&[&outer], "urn:one"), Some(Some("x".to_string())));
    }
}
