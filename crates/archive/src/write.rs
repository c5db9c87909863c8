//! Archive Rewriting

use crate::error::{ErrorKind, Result};
use crate::{Archive, Compression, MIMETYPE_PATH, Member};
use exn::ResultExt;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builder for a new container derived from an existing [`Archive`].
///
/// ```text
/// archive.rewrite()
///     .replace("OEBPS/content.opf", opf)   // in place, or appended if new
///     .insert(Member::mimetype())          // only if absent; mimetype goes first
///     .finish()?
/// ```
#[derive(Debug)]
pub struct Rewrite<'a> {
    archive: &'a Archive,
    replacements: HashMap<String, Vec<u8>>,
    added: Vec<String>,
    inserted: Vec<Member>,
}

impl<'a> Rewrite<'a> {
    pub(crate) fn new(archive: &'a Archive) -> Self {
        Self {
            archive,
            replacements: HashMap::new(),
            added: Vec::new(),
            inserted: Vec::new(),
        }
    }

    /// Write `data` at `name`. Existing members keep their position and
    /// compression metadata; new paths are deflated and appended at the end.
    pub fn replace(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        if !self.archive.contains(&name) && !self.replacements.contains_key(&name) {
            self.added.push(name.clone());
        }
        self.replacements.insert(name, data.into());
        self
    }

    /// Add `member` unless the source archive already has one of that name.
    pub fn insert(mut self, member: Member) -> Self {
        let exists = self.archive.contains(member.name())
            || self.replacements.contains_key(member.name())
            || self.inserted.iter().any(|m| m.name() == member.name());
        if exists {
            tracing::debug!(member = %member.name(), "member already present, not inserting");
        } else {
            self.inserted.push(member);
        }
        self
    }

    /// Serialize the new container.
    ///
    /// Output order: an inserted `mimetype` (which EPUB requires first), the
    /// source members in their original order, other inserted members, then
    /// replacements for paths that did not exist before.
    #[instrument(skip(self), fields(
        members = self.archive.len(),
        replaced = self.replacements.len(),
        inserted = self.inserted.len(),
        output_size
    ))]
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let (front, back): (Vec<Member>, Vec<Member>) =
            self.inserted.drain(..).partition(|member| member.name() == MIMETYPE_PATH);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for member in &front {
            write_member(&mut writer, member)?;
        }
        for member in self.archive.members() {
            match self.replacements.remove(member.name()) {
                Some(data) => write_member(&mut writer, &member.with_data(data))?,
                None => write_member(&mut writer, member)?,
            }
        }
        for member in &back {
            write_member(&mut writer, member)?;
        }
        for name in self.added {
            if let Some(data) = self.replacements.remove(&name) {
                write_member(&mut writer, &Member::new(name, data, Compression::Deflated))?;
            }
        }
        let output = writer.finish().or_raise(|| ErrorKind::Write)?.into_inner();
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }
}

fn write_member(writer: &mut ZipWriter<Cursor<Vec<u8>>>, member: &Member) -> Result<()> {
    let mut options = SimpleFileOptions::default().compression_method(match member.compression {
        Compression::Stored => CompressionMethod::Stored,
        Compression::Deflated => CompressionMethod::Deflated,
    });
    if let Some(modified) = member.modified {
        options = options.last_modified_time(modified);
    }
    if let Some(mode) = member.unix_mode {
        options = options.unix_permissions(mode);
    }
    if member.is_dir {
        writer.add_directory(member.name.as_str(), options).or_raise(|| ErrorKind::Write)?;
        return Ok(());
    }
    writer.start_file(member.name.as_str(), options).or_raise(|| ErrorKind::Write)?;
    writer.write_all(&member.data).or_raise(|| ErrorKind::Write)?;
    Ok(())
}
