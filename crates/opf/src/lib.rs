//! EPUB package document (OPF) handling.
//!
//! - [`locate_package`] finds the package document inside an [`Archive`](shelfprep_archive::Archive),
//!   and [`synthesize_package`] builds one when there isn't any.
//! - [`PackageDocument`] parses leniently, always has exactly one metadata
//!   block, and writes everything it didn't touch back as it was.
//! - [`MetadataBlock`] normalizes bibliographic metadata: single-valued fields
//!   are only filled when empty, multi-valued fields are unioned.

mod consts;
pub mod error;
mod locate;
mod metadata;
mod package;
mod xml;

pub use crate::consts::{CONTAINER_NS, CONTAINER_PATH, DC_NS, DEFAULT_PACKAGE_PATH, OPF_NS, PACKAGE_MEDIA_TYPE};
pub use crate::locate::{Synthesized, locate_package, synthesize_package};
pub use crate::metadata::{CollectionHint, Field, Metadata, MetadataBlock};
pub use crate::package::PackageDocument;
