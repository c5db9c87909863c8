//! Minimal owned XML tree.
//!
//! Package documents are small, so they are parsed into a mutable tree and
//! written back whole. Text and attribute values are kept in their *escaped*
//! form as read, so anything this crate doesn't touch is written back exactly
//! as it was (entities included). Namespaces are resolved once, at parse time.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use quick_xml::Writer;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;
use std::borrow::Cow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    /// Escaped character data.
    Text(String),
    CData(String),
    Comment(String),
    Instruction(String),
    DocType(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Element {
    /// Qualified name, exactly as written.
    pub(crate) name: String,
    /// Resolved namespace URI.
    pub(crate) namespace: Option<String>,
    /// `(qualified key, escaped value)` pairs, in document order.
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    pub(crate) fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Matches on local name, and on namespace when one is given.
    pub(crate) fn is(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name() == local_name && (namespace.is_none() || self.namespace.as_deref() == namespace)
    }

    /// Unescaped attribute value.
    pub(crate) fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, value)| unescape_lossy(value))
    }

    pub(crate) fn set_attribute(&mut self, key: &str, value: &str) {
        let value = escape(value).into_owned();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub(crate) fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Unescaped concatenation of the element's direct text content.
    pub(crate) fn text(&self) -> String {
        let mut text = String::new();
        for child in &self.children {
            match child {
                Node::Text(raw) => text.push_str(&unescape_lossy(raw)),
                Node::CData(data) => text.push_str(data),
                _ => {},
            }
        }
        text
    }

    /// Replaces the direct text content, leaving child elements alone.
    pub(crate) fn set_text(&mut self, text: &str) {
        self.children.retain(|child| !matches!(child, Node::Text(_) | Node::CData(_)));
        self.children.insert(0, Node::Text(escape(text).into_owned()));
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    pub(crate) fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Child element at `index` of [`children`](Self::children), if it is one.
    pub(crate) fn child_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index)? {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn push(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Depth-first search, returning the child-index path of the first match.
    pub(crate) fn find_path(&self, predicate: &impl Fn(&Element) -> bool) -> Option<Vec<usize>> {
        for (index, child) in self.children.iter().enumerate() {
            if let Node::Element(element) = child {
                if predicate(element) {
                    return Some(vec![index]);
                }
                if let Some(mut path) = element.find_path(predicate) {
                    path.insert(0, index);
                    return Some(path);
                }
            }
        }
        None
    }

    /// Depth-first search for the first matching descendant.
    pub(crate) fn find(&self, predicate: &impl Fn(&Element) -> bool) -> Option<&Element> {
        self.elements().find_map(|element| match predicate(element) {
            true => Some(element),
            false => element.find(predicate),
        })
    }

    /// Every value of attribute `key` in this subtree.
    pub(crate) fn collect_attribute(&self, key: &str, into: &mut Vec<String>) {
        if let Some(value) = self.attribute(key) {
            into.push(value);
        }
        for element in self.elements() {
            element.collect_attribute(key, into);
        }
    }

    /// Namespace declarations made on this element, as `(prefix, uri)` with
    /// `None` for the default namespace.
    pub(crate) fn namespace_declarations(&self) -> impl Iterator<Item = (Option<&str>, String)> {
        self.attributes.iter().filter_map(|(key, value)| match key.as_str() {
            "xmlns" => Some((None, unescape_lossy(value))),
            _ => key.strip_prefix("xmlns:").map(|prefix| (Some(prefix), unescape_lossy(value))),
        })
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute(Attribute {
                key: QName(key.as_bytes()),
                value: Cow::Borrowed(value.as_bytes()),
            });
        }
        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start));
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write(writer)?,
                Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
                other => write_misc(writer, other)?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))
    }
}

/// A parsed document: the root element plus whatever surrounds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Document {
    pub(crate) prolog: Vec<Node>,
    pub(crate) root: Element,
    pub(crate) epilog: Vec<Node>,
}

impl Document {
    pub(crate) fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse leniently: mismatched or unmatched end tags are tolerated, and a
    /// syntax error part-way through keeps everything read up to that point.
    ///
    /// Fails only when no root element could be recovered at all.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = NsReader::from_reader(bytes);
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            let (namespace, event) = match reader.read_resolved_event() {
                Ok((ResolveResult::Bound(namespace), event)) => {
                    (Some(String::from_utf8_lossy(namespace.as_ref()).into_owned()), event)
                },
                Ok((_, event)) => (None, event),
                Err(error) => {
                    tracing::warn!(%error, "recovering from malformed XML");
                    break;
                },
            };
            let node = match event {
                Event::Start(start) => {
                    stack.push(element_from(&start, namespace));
                    continue;
                },
                Event::End(_) => match stack.pop() {
                    Some(element) => Node::Element(element),
                    None => continue,
                },
                Event::Empty(start) => Node::Element(element_from(&start, namespace)),
                Event::Text(text) => Node::Text(lossy(&text)),
                Event::GeneralRef(reference) => Node::Text(format!("&{};", lossy(&reference))),
                Event::CData(data) => Node::CData(lossy(&data)),
                Event::Comment(comment) => Node::Comment(lossy(&comment)),
                Event::PI(instruction) => Node::Instruction(lossy(&instruction)),
                Event::DocType(doctype) => Node::DocType(lossy(&doctype)),
                Event::Decl(_) => continue,
                Event::Eof => break,
            };
            attach(node, &mut stack, &mut root, &mut prolog, &mut epilog);
        }
        if !stack.is_empty() {
            tracing::warn!(unclosed = stack.len(), "closing unterminated elements");
        }
        while let Some(element) = stack.pop() {
            attach(Node::Element(element), &mut stack, &mut root, &mut prolog, &mut epilog);
        }
        let root = root.ok_or_raise(|| ErrorKind::MalformedXml("no root element".to_string()))?;
        Ok(Self { prolog, root, epilog })
    }

    /// Serialize as UTF-8 with an XML declaration.
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer).or_raise(|| ErrorKind::Serialize)?;
        Ok(writer.into_inner())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        newline(writer)?;
        for node in &self.prolog {
            write_misc(writer, node)?;
            newline(writer)?;
        }
        self.root.write(writer)?;
        for node in &self.epilog {
            newline(writer)?;
            write_misc(writer, node)?;
        }
        Ok(())
    }
}

/// Routes a completed node to its parent, or to the document level.
fn attach(
    node: Node,
    stack: &mut [Element],
    root: &mut Option<Element>,
    prolog: &mut Vec<Node>,
    epilog: &mut Vec<Node>,
) {
    if let Some(parent) = stack.last_mut() {
        match (parent.children.last_mut(), node) {
            // Entity references arrive as separate events; keep text runs whole.
            (Some(Node::Text(previous)), Node::Text(text)) => previous.push_str(&text),
            (_, node) => parent.children.push(node),
        }
        return;
    }
    match node {
        // Whitespace (or stray text) outside the root element is not kept.
        Node::Text(_) => {},
        Node::Element(element) if root.is_none() => *root = Some(element),
        Node::Element(element) => {
            tracing::warn!(element = %element.name, "dropping second root element");
        },
        other if root.is_none() => prolog.push(other),
        other => epilog.push(other),
    }
}

fn element_from(start: &BytesStart<'_>, namespace: Option<String>) -> Element {
    let mut attributes = start.attributes();
    attributes.with_checks(false);
    Element {
        name: lossy(start.name().as_ref()),
        namespace,
        attributes: attributes
            .flatten()
            // Values are re-emitted double-quoted; a literal `"` from a
            // single-quoted value would otherwise end the attribute early.
            .map(|attribute| (lossy(attribute.key.as_ref()), lossy(&attribute.value).replace('"', "&quot;")))
            .collect(),
        children: Vec::new(),
    }
}

fn write_misc(writer: &mut Writer<Vec<u8>>, node: &Node) -> std::io::Result<()> {
    match node {
        Node::Element(element) => element.write(writer),
        Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str()))),
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str()))),
        Node::Comment(comment) => writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str()))),
        Node::Instruction(instruction) => writer.write_event(Event::PI(BytesPI::new(instruction.as_str()))),
        Node::DocType(doctype) => writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str()))),
    }
}

fn newline(writer: &mut Writer<Vec<u8>>) -> std::io::Result<()> {
    writer.write_event(Event::Text(BytesText::from_escaped("\n")))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Unknown entities (`&nbsp;` and friends, undeclared in XML) stay as written.
fn unescape_lossy(raw: &str) -> String {
    unescape(raw).map(Cow::into_owned).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Document {
        Document::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn resolves_namespaces() {
        let document = parse(
            r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Moby Dick</dc:title></metadata></package>"#,
        );
        assert_eq!(document.root.namespace.as_deref(), Some(crate::OPF_NS));
        let metadata = document.root.elements().next().unwrap();
        let title = metadata.elements().next().unwrap();
        assert!(title.is(Some(crate::DC_NS), "title"));
        assert_eq!(title.text(), "Moby Dick");
    }

    #[test]
    fn round_trip_preserves_untouched_content() {
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!-- generated -->\n<package a=\"1 &amp; 2\"><x>Fish &amp; Chips &#169;</x><![CDATA[<raw>]]><y/></package>";
        let document = parse(xml);
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert_eq!(output, xml);
    }

    #[test]
    fn text_is_unescaped_on_read_and_escaped_on_write() {
        let mut document = parse("<a><b>Fish &amp; Chips</b></a>");
        let b = document.root.child_mut(0).unwrap();
        assert_eq!(b.text(), "Fish & Chips");
        b.set_text("Salt & <Vinegar>");
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.ends_with("<a><b>Salt &amp; &lt;Vinegar&gt;</b></a>"));
    }

    #[test]
    fn tolerates_mismatched_and_unclosed_tags() {
        let document = parse("<package><metadata><title>Broken</wrong></metadata>");
        assert_eq!(document.root.local_name(), "package");
        let metadata = document.root.elements().next().unwrap();
        assert_eq!(metadata.elements().next().unwrap().text(), "Broken");
    }

    #[test]
    fn single_quoted_attribute_with_double_quote() {
        let document = parse(r#"<a title='say "hi"'/>"#);
        assert_eq!(document.root.attribute("title").as_deref(), Some("say \"hi\""));
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.ends_with(r#"<a title="say &quot;hi&quot;"/>"#));
    }

    #[test]
    fn rejects_documents_without_root() {
        let err = Document::parse(b"   just some text   ").unwrap_err();
        assert!(matches!(*err, ErrorKind::MalformedXml(_)));
    }

    #[test]
    fn find_path_is_depth_first() {
        let document = parse("<r><a><target id=\"1\"/></a><target id=\"2\"/></r>");
        let path = document.root.find_path(&|e: &Element| e.local_name() == "target").unwrap();
        assert_eq!(path, vec![0, 0]);
    }
}
