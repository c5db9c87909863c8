//! Package Document Location & Synthesis

use crate::consts::{CONTAINER_NS, CONTAINER_PATH, PACKAGE_MEDIA_TYPE};
use crate::error::Result;
use crate::package::PackageDocument;
use crate::xml::{Document, Element};
use shelfprep_archive::{Archive, MIMETYPE_PATH, Member};
use tracing::instrument;

/// Find the package document's path.
///
/// The container pointer (`META-INF/container.xml`) is consulted first; its
/// first `rootfile` is used if it names a member that actually exists.
/// Otherwise the first member (in archive order) with an `.opf` extension is
/// used. `None` means the archive has no package document at all.
#[instrument(skip(archive), fields(members = archive.len()))]
pub fn locate_package(archive: &Archive) -> Option<String> {
    if let Some(path) = archive.get(CONTAINER_PATH).and_then(|member| rootfile_path(member.data())) {
        if archive.contains(&path) {
            tracing::debug!(%path, "package located via container pointer");
            return Some(path);
        }
        tracing::warn!(%path, "container pointer names a missing member");
    }
    let path = archive
        .members()
        .iter()
        .find(|member| !member.is_dir() && member.extension().as_deref() == Some("opf"))
        .map(|member| member.name().to_string());
    match &path {
        Some(path) => tracing::debug!(%path, "package located by extension scan"),
        None => tracing::debug!("no package document found"),
    }
    path
}

/// `full-path` of the first `rootfile` element, if non-blank.
fn rootfile_path(bytes: &[u8]) -> Option<String> {
    let document = Document::parse(bytes).ok()?;
    let rootfile = document.root.find(&|element: &Element| element.local_name() == "rootfile")?;
    rootfile.attribute("full-path").map(|path| path.trim().to_string()).filter(|path| !path.is_empty())
}

/// Everything needed to give a package-less archive a package document.
#[derive(Clone, Debug)]
pub struct Synthesized {
    /// Where the package document goes.
    pub path: String,
    /// A container pointer referencing [`path`](Self::path).
    pub container: Vec<u8>,
    /// A minimal, empty package document.
    pub document: PackageDocument,
}

impl Synthesized {
    /// Members to add alongside the package document: the `mimetype` member,
    /// unless `archive` already has one.
    pub fn extra_members(&self, archive: &Archive) -> Vec<Member> {
        if archive.contains(MIMETYPE_PATH) {
            Vec::new()
        } else {
            vec![Member::mimetype()]
        }
    }
}

/// Build a minimal package document at `path` and a container pointer
/// referencing it.
#[instrument]
pub fn synthesize_package(path: &str) -> Result<Synthesized> {
    let rootfile = Element::new("rootfile", Some(CONTAINER_NS))
        .with_attribute("full-path", path)
        .with_attribute("media-type", PACKAGE_MEDIA_TYPE);
    let mut rootfiles = Element::new("rootfiles", Some(CONTAINER_NS));
    rootfiles.push(rootfile);
    let mut container = Element::new("container", Some(CONTAINER_NS))
        .with_attribute("version", "1.0")
        .with_attribute("xmlns", CONTAINER_NS);
    container.push(rootfiles);
    Ok(Synthesized {
        path: path.to_string(),
        container: Document::new(container).to_bytes()?,
        document: PackageDocument::minimal(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_PACKAGE_PATH;
    use rstest::rstest;
    use shelfprep_archive::Compression;

    fn container(full_path: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="{full_path}" media-type="application/oebps-package+xml"/></rootfiles></container>"#
        )
    }

    fn archive(members: &[(&str, &str)]) -> Archive {
        let archive = Archive::default();
        let rewrite = archive.rewrite();
        let bytes = members
            .iter()
            .fold(rewrite, |rewrite, (name, data)| rewrite.insert(Member::new(*name, *data, Compression::Deflated)))
            .finish()
            .unwrap();
        Archive::open(bytes).unwrap()
    }

    #[test]
    fn container_pointer_wins() {
        let pointer = container("content/book.opf");
        let archive = archive(&[
            ("META-INF/container.xml", pointer.as_str()),
            ("OEBPS/other.opf", "<package/>"),
            ("content/book.opf", "<package/>"),
        ]);
        assert_eq!(locate_package(&archive).as_deref(), Some("content/book.opf"));
    }

    #[rstest]
    #[case::dangling_pointer(Some(container("missing.opf")))]
    #[case::blank_pointer(Some(container("  ")))]
    #[case::unparsable_pointer(Some("not xml at all".to_string()))]
    #[case::no_pointer(None)]
    fn falls_back_to_first_opf(#[case] pointer: Option<String>) {
        let mut members = vec![("OEBPS/text.xhtml", "<p/>"), ("OEBPS/first.OPF", "<package/>"), ("second.opf", "<package/>")];
        if let Some(pointer) = &pointer {
            members.insert(0, ("META-INF/container.xml", pointer.as_str()));
        }
        assert_eq!(locate_package(&archive(&members)).as_deref(), Some("OEBPS/first.OPF"));
    }

    #[test]
    fn nothing_to_locate() {
        let archive = archive(&[("OEBPS/text.xhtml", "<p/>")]);
        assert_eq!(locate_package(&archive), None);
    }

    #[test]
    fn synthesized_container_points_at_package() {
        let synthesized = synthesize_package(DEFAULT_PACKAGE_PATH).unwrap();
        assert_eq!(rootfile_path(&synthesized.container).as_deref(), Some(DEFAULT_PACKAGE_PATH));
        let xml = String::from_utf8(synthesized.container.clone()).unwrap();
        assert!(xml.contains(r#"media-type="application/oebps-package+xml""#));
        assert_eq!(synthesized.document, PackageDocument::minimal());
    }

    #[test]
    fn mimetype_only_added_when_missing() {
        let synthesized = synthesize_package(DEFAULT_PACKAGE_PATH).unwrap();
        let without = archive(&[("OEBPS/text.xhtml", "<p/>")]);
        assert_eq!(synthesized.extra_members(&without), vec![Member::mimetype()]);
        let with = archive(&[("mimetype", "application/epub+zip")]);
        assert!(synthesized.extra_members(&with).is_empty());
    }
}
