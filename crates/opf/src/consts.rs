/// OCF container namespace (`META-INF/container.xml`).
pub const CONTAINER_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
/// OPF package namespace.
pub const OPF_NS: &str = "http://www.idpf.org/2007/opf";
/// Dublin Core elements namespace.
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Fixed location of the container pointer.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
/// Conventional package document location used when one has to be synthesized.
pub const DEFAULT_PACKAGE_PATH: &str = "OEBPS/content.opf";
/// Media type declared for the package document in the container pointer.
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

pub(crate) const PROPERTY_COLLECTION: &str = "belongs-to-collection";
pub(crate) const PROPERTY_POSITION: &str = "group-position";
pub(crate) const CALIBRE_SERIES: &str = "calibre:series";
