//! Archive Reading

use crate::error::{ErrorKind, Result};
use crate::{Archive, Compression, Member};
use exn::ResultExt;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use tracing::instrument;
use zip::{CompressionMethod, ZipArchive};

impl Archive {
    /// Read a zip container fully into memory.
    ///
    /// Every member is decompressed up-front (which also verifies its CRC), so
    /// any later [`rewrite`](Self::rewrite) works on known-good data.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::InvalidArchive`] if `bytes` is not a zip container.
    /// - [`ErrorKind::Decompress`] if a member is corrupt or uses a compression
    ///   method other than stored/deflate.
    /// - [`ErrorKind::DuplicateMember`] if two members share a path.
    #[instrument(skip(bytes), fields(input_size = bytes.as_ref().len(), members))]
    pub fn open(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::InvalidArchive)?;
        let mut members = Vec::with_capacity(zip.len());
        let mut seen = HashSet::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut file = zip.by_index(index).or_raise(|| ErrorKind::InvalidArchive)?;
            let name = file.name().to_string();
            if !seen.insert(name.clone()) {
                exn::bail!(ErrorKind::DuplicateMember(name));
            }
            let compression = match file.compression() {
                CompressionMethod::Stored => Compression::Stored,
                CompressionMethod::Deflated => Compression::Deflated,
                _ => exn::bail!(ErrorKind::Decompress(name)),
            };
            // Declared sizes are untrusted; never reserve more than the input itself.
            let hint = usize::try_from(file.size()).unwrap_or_default().min(bytes.len());
            let mut data = Vec::with_capacity(hint);
            file.read_to_end(&mut data).or_raise(|| ErrorKind::Decompress(name.clone()))?;
            tracing::trace!(member = %name, size = data.len(), ?compression, "read member");
            members.push(Member {
                compression,
                modified: file.last_modified(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
                name,
                data,
            });
        }
        tracing::Span::current().record("members", members.len());
        Ok(Self { members })
    }
}
