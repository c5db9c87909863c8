//! Metadata block reading and normalization.
//!
//! Two kinds of update are supported, matching how bibliographic facts behave
//! when they come from more than one source:
//!
//! - **Ensure** (title, language): single-valued; only filled when empty, never
//!   overwritten.
//! - **Append** (creators, subjects, collection hints): multi-valued; unioned
//!   across sources. Creators are deduplicated by exact match, subjects
//!   case-insensitively.

use crate::consts::{CALIBRE_SERIES, DC_NS, OPF_NS, PROPERTY_COLLECTION, PROPERTY_POSITION};
use crate::package::qualify;
use crate::xml::{Element, Node};
use std::collections::HashSet;

/// Single-valued Dublin Core fields with "ensure" semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Language,
}

impl Field {
    fn tag(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Language => "language",
        }
    }
}

/// An EPUB 3 `belongs-to-collection` hint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionHint {
    /// Collection name
    pub name: String,
    /// Element ID, referenced by refinements
    pub id: Option<String>,
    /// Position within the collection, from a `group-position` refinement
    pub position: Option<u32>,
}

/// Read-only view of a package's metadata block.
#[derive(Clone, Copy, Debug)]
pub struct Metadata<'a> {
    element: &'a Element,
}

impl<'a> Metadata<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    pub fn title(&self) -> Option<String> {
        self.field(Field::Title)
    }

    pub fn language(&self) -> Option<String> {
        self.field(Field::Language)
    }

    /// First non-blank value of a single-valued field.
    pub fn field(&self, field: Field) -> Option<String> {
        self.dc(field.tag()).map(|element| element.text().trim().to_string()).find(|text| !text.is_empty())
    }

    pub fn creators(&self) -> Vec<String> {
        self.texts("creator")
    }

    pub fn subjects(&self) -> Vec<String> {
        self.texts("subject")
    }

    /// Collection hints in document order, with positions resolved through
    /// `refines` links.
    pub fn collection_hints(&self) -> Vec<CollectionHint> {
        self.metas()
            .filter(|meta| meta.attribute("property").as_deref() == Some(PROPERTY_COLLECTION))
            .filter_map(|meta| {
                let name = meta.text().trim().to_string();
                if name.is_empty() {
                    return None;
                }
                let id = meta.attribute("id");
                let position = id.as_deref().and_then(|id| self.position_of(id));
                Some(CollectionHint { name, id, position })
            })
            .collect()
    }

    /// Resolve the series designation: a calibre-style `calibre:series`
    /// annotation wins, otherwise the first collection hint's name.
    pub fn series(&self) -> Option<String> {
        self.metas()
            .filter(|meta| meta.attribute("name").as_deref() == Some(CALIBRE_SERIES))
            .map(|meta| meta.attribute("content").unwrap_or_else(|| meta.text()).trim().to_string())
            .find(|series| !series.is_empty())
            .or_else(|| self.collection_hints().into_iter().next().map(|hint| hint.name))
    }

    fn position_of(&self, id: &str) -> Option<u32> {
        let target = format!("#{id}");
        self.metas()
            .filter(|meta| meta.attribute("property").as_deref() == Some(PROPERTY_POSITION))
            .find(|meta| meta.attribute("refines").as_deref() == Some(target.as_str()))
            .and_then(|meta| meta.text().trim().parse().ok())
    }

    fn dc(&self, tag: &'static str) -> impl Iterator<Item = &'a Element> {
        self.element.elements().filter(move |element| is_dc(element, tag))
    }

    fn texts(&self, tag: &'static str) -> Vec<String> {
        self.dc(tag).map(|element| element.text().trim().to_string()).filter(|text| !text.is_empty()).collect()
    }

    fn metas(&self) -> impl Iterator<Item = &'a Element> {
        self.element.elements().filter(|element| is_meta(element))
    }
}

/// Mutable view of a package's metadata block.
///
/// Obtained from [`PackageDocument::metadata_mut`](crate::PackageDocument::metadata_mut).
#[derive(Debug)]
pub struct MetadataBlock<'a> {
    element: &'a mut Element,
    /// Prefix bound to the Dublin Core namespace; `None` until declared.
    dc: Option<Option<String>>,
    /// Prefix bound to the OPF namespace, if any.
    opf: Option<Option<String>>,
    /// Every `id` in the document, for collision-free collection IDs.
    ids: HashSet<String>,
}

impl<'a> MetadataBlock<'a> {
    pub(crate) fn new(
        element: &'a mut Element,
        dc: Option<Option<String>>,
        opf: Option<Option<String>>,
        ids: HashSet<String>,
    ) -> Self {
        Self { element, dc, opf, ids }
    }

    pub fn read(&self) -> Metadata<'_> {
        Metadata::new(self.element)
    }

    /// Set `field` to `value` only if it is currently missing or blank.
    ///
    /// Returns `true` if the block changed. A blank `value` never changes
    /// anything.
    pub fn ensure_field(&mut self, field: Field, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        let tag = field.tag();
        if let Some(existing) = self.read().field(field) {
            tracing::trace!(field = tag, %existing, "keeping existing value");
            return false;
        }
        let blank = self.element.children.iter().position(|child| matches!(child, Node::Element(element) if is_dc(element, tag)));
        match blank.and_then(|index| self.element.child_mut(index)) {
            Some(element) => element.set_text(value),
            None => {
                let element = self.dc_element(tag).with_text(value);
                self.element.push(element);
            },
        }
        tracing::debug!(field = tag, value, "filled empty field");
        true
    }

    /// Append each creator not already present (exact, case-sensitive match).
    ///
    /// Returns the number of creators added.
    pub fn add_creators<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut existing: HashSet<String> = self.read().creators().into_iter().collect();
        let mut added = 0;
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && existing.insert(name.to_string()) {
                let element = self.dc_element("creator").with_text(name);
                self.element.push(element);
                added += 1;
            }
        }
        added
    }

    /// Append each subject not already present (case-insensitive match),
    /// preserving the given order.
    ///
    /// Returns the number of subjects added.
    pub fn add_subjects<I, S>(&mut self, subjects: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut existing: HashSet<String> =
            self.read().subjects().into_iter().map(|subject| subject.to_lowercase()).collect();
        let mut added = 0;
        for subject in subjects {
            let subject = subject.as_ref().trim();
            if !subject.is_empty() && existing.insert(subject.to_lowercase()) {
                let element = self.dc_element("subject").with_text(subject);
                self.element.push(element);
                added += 1;
            }
        }
        added
    }

    /// Append a collection hint, plus a `group-position` refinement when
    /// `position` is given.
    ///
    /// Never merges with existing hints: calling this twice with the same name
    /// yields two hints. IDs are derived from the name, so identical input
    /// always gives identical output. Returns the new hint's ID, or `None` for
    /// a blank name.
    pub fn add_collection_hint(&mut self, name: &str, position: Option<u32>) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let id = self.collection_id(name);
        let hint = self
            .meta_element()
            .with_attribute("property", PROPERTY_COLLECTION)
            .with_attribute("id", &id)
            .with_text(name);
        self.element.push(hint);
        if let Some(position) = position {
            let refinement = self
                .meta_element()
                .with_attribute("refines", &format!("#{id}"))
                .with_attribute("property", PROPERTY_POSITION)
                .with_text(&position.to_string());
            self.element.push(refinement);
        }
        tracing::debug!(collection = name, id, ?position, "added collection hint");
        Some(id)
    }

    /// Add a bare collection hint unless one with the same name
    /// (case-insensitive) already exists. Returns `true` if added.
    pub fn ensure_collection(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let lowered = name.to_lowercase();
        if self.read().collection_hints().iter().any(|hint| hint.name.to_lowercase() == lowered) {
            return false;
        }
        let hint = self.meta_element().with_attribute("property", PROPERTY_COLLECTION).with_text(name);
        self.element.push(hint);
        true
    }

    /// See [`Metadata::series`].
    pub fn resolve_series(&self) -> Option<String> {
        self.read().series()
    }

    /// `col-` followed by up to eight digits of the name's BLAKE3 hash,
    /// suffixed when that ID is already taken in the document.
    fn collection_id(&mut self, name: &str) -> String {
        let hash = blake3::hash(name.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        let base = format!("col-{}", u64::from_le_bytes(head) % 100_000_000);
        let mut id = base.clone();
        let mut suffix = 2;
        while !self.ids.insert(id.clone()) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        id
    }

    fn dc_element(&mut self, tag: &str) -> Element {
        let prefix = match &self.dc {
            Some(prefix) => prefix.clone(),
            None => {
                self.element.set_attribute("xmlns:dc", DC_NS);
                let prefix = Some("dc".to_string());
                self.dc = Some(prefix.clone());
                prefix
            },
        };
        Element::new(qualify(Some(&prefix), tag), Some(DC_NS))
    }

    fn meta_element(&self) -> Element {
        Element::new(qualify(self.opf.as_ref(), "meta"), self.opf.is_some().then_some(OPF_NS))
    }
}

fn is_dc(element: &Element, tag: &str) -> bool {
    element.namespace.as_deref() == Some(DC_NS) && element.local_name() == tag
}

fn is_meta(element: &Element) -> bool {
    element.local_name() == "meta" && matches!(element.namespace.as_deref(), None | Some(OPF_NS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackageDocument;
    use rstest::rstest;

    const EPUB3: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:1234</dc:identifier>
    <dc:title>Foo</dc:title>
    <dc:creator>Herman Melville</dc:creator>
    <dc:subject>Fantasy</dc:subject>
  </metadata>
  <manifest/>
  <spine/>
</package>"#;

    fn package(xml: &str) -> PackageDocument {
        PackageDocument::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn ensure_never_overwrites() {
        let mut document = package(EPUB3);
        assert!(!document.metadata_mut().ensure_field(Field::Title, "Bar"));
        assert_eq!(document.metadata().title().as_deref(), Some("Foo"));
    }

    #[test]
    fn ensure_fills_blank_and_missing_fields() {
        let mut document = package(
            r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>  </dc:title></metadata></package>"#,
        );
        let mut metadata = document.metadata_mut();
        assert!(metadata.ensure_field(Field::Title, "Moby Dick"));
        assert!(metadata.ensure_field(Field::Language, "en"));
        assert!(!metadata.ensure_field(Field::Language, "fr"));
        assert!(!metadata.ensure_field(Field::Language, ""));
        assert_eq!(document.metadata().title().as_deref(), Some("Moby Dick"));
        assert_eq!(document.metadata().language().as_deref(), Some("en"));
    }

    #[test]
    fn creators_dedup_exactly() {
        let mut document = package(EPUB3);
        let added = document.metadata_mut().add_creators(["Herman Melville", "herman melville", "", "Herman Melville"]);
        assert_eq!(added, 1);
        assert_eq!(document.metadata().creators(), vec!["Herman Melville", "herman melville"]);
    }

    #[rstest]
    #[case(&["fantasy"], &["Fantasy"])]
    #[case(&["FANTASY", "Adventure", "adventure"], &["Fantasy", "Adventure"])]
    #[case(&["  Sea stories  ", ""], &["Fantasy", "Sea stories"])]
    fn subjects_dedup_case_insensitively(#[case] subjects: &[&str], #[case] expected: &[&str]) {
        let mut document = package(EPUB3);
        document.metadata_mut().add_subjects(subjects);
        assert_eq!(document.metadata().subjects(), expected);
    }

    #[test]
    fn subjects_added_across_calls_stay_unique() {
        let mut document = package(r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata/></package>"#);
        document.metadata_mut().add_subjects(["Fantasy"]);
        document.metadata_mut().add_subjects(["fantasy"]);
        assert_eq!(document.metadata().subjects(), vec!["Fantasy"]);
    }

    #[test]
    fn collection_hint_with_position() {
        let mut document = package(EPUB3);
        let id = document.metadata_mut().add_collection_hint("Adventure stories", Some(3)).unwrap();
        assert!(id.starts_with("col-"));
        let hints = document.metadata().collection_hints();
        assert_eq!(
            hints,
            vec![CollectionHint {
                name: "Adventure stories".to_string(),
                id: Some(id.clone()),
                position: Some(3),
            }]
        );
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.contains(&format!(r#"<meta property="belongs-to-collection" id="{id}">Adventure stories</meta>"#)));
        assert!(output.contains(&format!(r##"<meta refines="#{id}" property="group-position">3</meta>"##)));
    }

    #[test]
    fn collection_hints_accumulate_with_distinct_ids() {
        let mut document = package(EPUB3);
        let first = document.metadata_mut().add_collection_hint("Sea", None).unwrap();
        let second = document.metadata_mut().add_collection_hint("Sea", Some(2)).unwrap();
        assert_ne!(first, second);
        assert_eq!(second, format!("{first}-2"));
        let hints = document.metadata().collection_hints();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints[0].position, None);
        assert_eq!(hints[1].position, Some(2));
    }

    #[test]
    fn collection_ids_are_deterministic() {
        let mut a = package(EPUB3);
        let mut b = package(EPUB3);
        a.metadata_mut().add_collection_hint("Science Fiction", Some(1));
        b.metadata_mut().add_collection_hint("Science Fiction", Some(1));
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn blank_collection_name_adds_nothing() {
        let mut document = package(EPUB3);
        assert_eq!(document.metadata_mut().add_collection_hint("   ", Some(1)), None);
        assert!(document.metadata().collection_hints().is_empty());
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let mut document = package(EPUB3);
        assert!(document.metadata_mut().ensure_collection("Standard Ebooks"));
        assert!(!document.metadata_mut().ensure_collection("standard ebooks"));
        assert_eq!(document.metadata().collection_hints().len(), 1);
    }

    #[test]
    fn calibre_series_takes_precedence() {
        let mut document = package(
            r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata><meta name="calibre:series" content="Foundation"/></metadata></package>"#,
        );
        document.metadata_mut().add_collection_hint("Science Fiction", None);
        assert_eq!(document.metadata().series().as_deref(), Some("Foundation"));
    }

    #[rstest]
    #[case::text_content(r#"<meta name="calibre:series">Foundation</meta>"#, Some("Foundation"))]
    #[case::blank_calibre_falls_back(
        r#"<meta name="calibre:series" content=" "/><meta property="belongs-to-collection">Sea</meta>"#,
        Some("Sea")
    )]
    #[case::first_collection(
        r#"<meta property="belongs-to-collection">One</meta><meta property="belongs-to-collection">Two</meta>"#,
        Some("One")
    )]
    #[case::none(r#"<meta property="dcterms:modified">2020-01-01T00:00:00Z</meta>"#, None)]
    fn series_resolution(#[case] metas: &str, #[case] expected: Option<&str>) {
        let document =
            package(&format!(r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata>{metas}</metadata></package>"#));
        assert_eq!(document.metadata().series().as_deref(), expected);
    }

    #[test]
    fn prefixed_documents_get_prefixed_elements() {
        let mut document = package(
            r#"<opf:package xmlns:opf="http://www.idpf.org/2007/opf" xmlns:dc="http://purl.org/dc/elements/1.1/"><opf:metadata/></opf:package>"#,
        );
        let mut metadata = document.metadata_mut();
        metadata.add_subjects(["Poetry"]);
        metadata.add_collection_hint("Verse", None);
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.contains("<opf:metadata><dc:subject>Poetry</dc:subject><opf:meta property=\"belongs-to-collection\""));
        assert_eq!(document.metadata().series().as_deref(), Some("Verse"));
    }

    #[test]
    fn undeclared_dc_namespace_is_declared() {
        let mut document = package(r#"<package xmlns="http://www.idpf.org/2007/opf"><metadata/></package>"#);
        document.metadata_mut().add_creators(["Anonymous"]);
        let output = String::from_utf8(document.to_bytes().unwrap()).unwrap();
        assert!(output.contains(
            r#"<metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:creator>Anonymous</dc:creator></metadata>"#
        ));
    }
}
