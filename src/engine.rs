use crate::error::{ErrorKind, Result};
use crate::folder::series_folder;
use crate::validate::{Validation, Validator};
use exn::{OptionExt, ResultExt};
use shelfprep_archive::{Archive, Rewrite};
use shelfprep_config::Config;
use shelfprep_opf::{CONTAINER_PATH, Field, MetadataBlock, PackageDocument, Synthesized, locate_package, synthesize_package};
use shelfprep_scrub::Scrubber;
use tracing::instrument;

/// Bibliographic facts about a title, as resolved by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    pub title: String,
    /// In display order.
    pub creators: Vec<String>,
    /// BCP 47 code, e.g. `en`.
    pub language: Option<String>,
    /// The caller's organizing subject should come first.
    pub subjects: Vec<String>,
    /// Collection to add a hint for, e.g. the subject a title was found under.
    pub collection: Option<String>,
    /// Position within [`collection`](Self::collection).
    pub collection_position: Option<u32>,
    /// Library-wide grouping, added once and never duplicated.
    pub library_collection: Option<String>,
}

/// Output of [`Engine::embed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embedded {
    pub bytes: Vec<u8>,
    /// Series designation read back from the normalized metadata.
    pub series: Option<String>,
    /// Path of the package document inside the archive.
    pub package_path: String,
    /// `true` if the input had no package document and one was created.
    pub synthesized: bool,
}

/// Output of [`Engine::process`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Processed {
    pub bytes: Vec<u8>,
    pub series: Option<String>,
    pub package_path: String,
    pub synthesized: bool,
    pub validation: Validation,
}

impl Processed {
    /// Folder to file this title under. See [`series_folder`].
    pub fn folder(&self, title: &str) -> String {
        series_folder(title, self.series.as_deref())
    }
}

/// The sanitization and metadata pipeline.
///
/// An engine holds only compiled, immutable settings; it can be shared across
/// threads and each call works on its own copy of the input.
#[derive(Clone, Debug)]
pub struct Engine {
    /// `None` when scrubbing is disabled.
    scrubber: Option<Scrubber>,
    validator: Validator,
    package_path: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(&Config::default()).expect("default configuration is valid")
    }
}

impl Engine {
    /// # Errors
    ///
    /// Returns [`ErrorKind::Config`] if the configuration doesn't validate.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let scrubber = if config.scrub.enabled {
            Some(Scrubber::new(&config.scrub.rules()).or_raise(|| ErrorKind::Config)?)
        } else {
            None
        };
        Ok(Self {
            scrubber,
            validator: Validator::from_config(config)?,
            package_path: config.package.path.trim().to_string(),
        })
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Scrub, normalize metadata, then validate the result.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Archive`] if `bytes` isn't a readable zip container.
    /// - [`ErrorKind::Scrub`] if the scrubbed archive can't be rebuilt.
    /// - [`ErrorKind::Package`] if the package document can't be recovered.
    ///
    /// Validation findings are returned in [`Processed::validation`], never as
    /// errors.
    #[instrument(skip_all, fields(input_size = bytes.len(), title = %record.title, output_size, compliant))]
    pub fn process(&self, bytes: &[u8], record: &MetadataRecord) -> Result<Processed> {
        let mut archive = Archive::open(bytes).or_raise(|| ErrorKind::Archive)?;
        if let Some(scrubber) = &self.scrubber {
            let scrubbed = scrubber.scrub_archive(&archive).or_raise(|| ErrorKind::Scrub)?;
            archive = Archive::open(scrubbed).or_raise(|| ErrorKind::Archive)?;
        }
        let embedded = self.embed_archive(&archive, record)?;
        let validation = self.validator.validate(&embedded.bytes);
        let span = tracing::Span::current();
        span.record("output_size", embedded.bytes.len());
        span.record("compliant", validation.compliant);
        Ok(Processed {
            bytes: embedded.bytes,
            series: embedded.series,
            package_path: embedded.package_path,
            synthesized: embedded.synthesized,
            validation,
        })
    }

    /// Normalize the package metadata of `bytes` against `record`, without
    /// scrubbing or validating.
    ///
    /// Every member other than the package document is copied unchanged. An
    /// archive without a package document gets one, along with a container
    /// pointer and (if missing) a `mimetype` member.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Archive`] if `bytes` isn't a readable zip container.
    /// - [`ErrorKind::Package`] if the package document can't be recovered.
    #[instrument(skip_all, fields(input_size = bytes.len(), title = %record.title))]
    pub fn embed(&self, bytes: &[u8], record: &MetadataRecord) -> Result<Embedded> {
        let archive = Archive::open(bytes).or_raise(|| ErrorKind::Archive)?;
        self.embed_archive(&archive, record)
    }

    fn embed_archive(&self, archive: &Archive, record: &MetadataRecord) -> Result<Embedded> {
        let (package_path, mut document, additions) = match locate_package(archive) {
            Some(path) => {
                let member = archive.get(&path).ok_or_raise(|| ErrorKind::Package)?;
                let document = PackageDocument::parse(member.data()).or_raise(|| ErrorKind::Package)?;
                (path, document, None)
            },
            None => {
                tracing::warn!(path = %self.package_path, "archive has no package document, synthesizing one");
                let synthesized = synthesize_package(&self.package_path).or_raise(|| ErrorKind::Package)?;
                let extra = synthesized.extra_members(archive);
                let Synthesized { path, container, document } = synthesized;
                (path, document, Some((container, extra)))
            },
        };

        let series = normalize(document.metadata_mut(), record);
        let package = document.to_bytes().or_raise(|| ErrorKind::Package)?;
        let synthesized = additions.is_some();
        let bytes = match additions {
            None => archive.rewrite_package(&package_path, package, []),
            Some((container, extra)) => extra
                .into_iter()
                .fold(archive.rewrite().replace(CONTAINER_PATH, container), Rewrite::insert)
                .replace(package_path.as_str(), package)
                .finish(),
        }
        .or_raise(|| ErrorKind::Archive)?;

        tracing::debug!(package = %package_path, synthesized, series = ?series, output_size = bytes.len(), "embedded metadata");
        Ok(Embedded {
            bytes,
            series,
            package_path,
            synthesized,
        })
    }
}

/// Apply `record` with ensure/append semantics and read back the series.
fn normalize(mut metadata: MetadataBlock<'_>, record: &MetadataRecord) -> Option<String> {
    metadata.ensure_field(Field::Title, &record.title);
    metadata.add_creators(&record.creators);
    if let Some(language) = &record.language {
        metadata.ensure_field(Field::Language, language);
    }
    metadata.add_subjects(&record.subjects);
    if let Some(collection) = &record.collection {
        metadata.add_collection_hint(collection, record.collection_position);
    }
    if let Some(library) = &record.library_collection {
        metadata.ensure_collection(library);
    }
    metadata.resolve_series()
}
