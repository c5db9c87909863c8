//! In-memory EPUB container handling.
//!
//! An EPUB is a zip container. This crate reads one fully into memory as an
//! ordered list of [`Member`]s and rebuilds new containers from it,
//! substituting only the members a caller asks to replace:
//!
//! - **Reading** ([`Archive::open`]) decompresses every member eagerly, so a
//!   corrupt member fails the open rather than a later rewrite.
//! - **Rewriting** ([`Archive::rewrite`]) copies every untouched member with
//!   identical bytes, compression method, timestamp and permissions, in the
//!   original member order.
//!
//! The input [`Archive`] is never mutated; every rewrite produces fresh bytes.

pub mod error;
mod read;
mod write;

pub use crate::write::Rewrite;

/// Path of the EPUB media-type member.
pub const MIMETYPE_PATH: &str = "mimetype";
/// Contents of the EPUB media-type member.
pub const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Lowercased extension of a member path, without the dot. Dotfiles have none.
pub fn extension(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Compression method of a single member.
///
/// Only the methods an EPUB reading system is required to support are
/// accepted; anything else fails to decompress on [`Archive::open`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Stored without compression.
    Stored,
    /// Deflate.
    #[default]
    Deflated,
}

/// One file entry inside an [`Archive`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    name: String,
    data: Vec<u8>,
    compression: Compression,
    modified: Option<zip::DateTime>,
    unix_mode: Option<u32>,
    is_dir: bool,
}

impl Member {
    /// A new file member. Synthesized members carry no timestamp, so the
    /// output stays identical across runs.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>, compression: Compression) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            compression,
            modified: None,
            unix_mode: None,
            is_dir: false,
        }
    }

    /// The conventional `mimetype` member: stored, never compressed.
    pub fn mimetype() -> Self {
        Self::new(MIMETYPE_PATH, EPUB_MIMETYPE, Compression::Stored)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decompressed member contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// See [`extension`].
    pub fn extension(&self) -> Option<String> {
        extension(&self.name)
    }

    /// Same member metadata, different contents.
    pub(crate) fn with_data(&self, data: Vec<u8>) -> Self {
        Self { data, ..self.clone() }
    }
}

/// An ordered collection of uniquely-named [`Member`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Archive {
    members: Vec<Member>,
}

impl Archive {
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|member| member.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Member paths, in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(Member::name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Start building a new container from this one. See [`Rewrite`].
    pub fn rewrite(&self) -> Rewrite<'_> {
        Rewrite::new(self)
    }

    /// Rebuild the container with `data` written at `path`, and each of
    /// `extra` added when no member of that name exists yet.
    ///
    /// Every other member is copied unchanged. A `path` not already present is
    /// appended after the existing members.
    pub fn rewrite_package(
        &self,
        path: &str,
        data: impl Into<Vec<u8>>,
        extra: impl IntoIterator<Item = Member>,
    ) -> error::Result<Vec<u8>> {
        extra.into_iter().fold(self.rewrite().replace(path, data), Rewrite::insert).finish()
    }
}
