//! Layered configuration for the shelfprep engine.
//!
//! Sources, lowest precedence first:
//!
//! 1. built-in defaults ([`Config::default`]);
//! 2. a TOML, YAML or JSON file (format picked by extension);
//! 3. `SHELFPREP_`-prefixed environment variables, with `__` separating
//!    nested keys (`SHELFPREP_SCRUB__ENABLED=false`,
//!    `SHELFPREP_VALIDATE__MIN_SIZE=1024`).
//!
//! ```toml
//! [scrub]
//! enabled = true
//! marker = 'project\s+gutenberg'
//! encodings = ["utf-8", "windows-1252", "latin-1"]
//!
//! [validate]
//! min_size = 200
//!
//! [package]
//! path = "OEBPS/content.opf"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use shelfprep_opf::DEFAULT_PACKAGE_PATH;
use shelfprep_scrub::{
    DEFAULT_HOST_MARKER, DEFAULT_MARKER, DEFAULT_TERMS, DEFAULT_TEXT_EXTENSIONS, Encoding, Rules, Scrubber,
};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "SHELFPREP_";
/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Archives smaller than this many bytes are suspiciously small.
pub const DEFAULT_MIN_SIZE: usize = 200;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scrub: ScrubConfig,
    pub validate: ValidateConfig,
    pub package: PackageConfig,
}

/// Boilerplate scrubbing. Patterns are case-insensitive regular expressions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    /// Skip the scrub stage entirely when `false`.
    pub enabled: bool,
    pub marker: String,
    pub host_marker: String,
    pub terms: Vec<String>,
    /// Extensions of members treated as text.
    pub extensions: Vec<String>,
    /// Tried in order for each text member.
    pub encodings: Vec<Encoding>,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            marker: DEFAULT_MARKER.to_string(),
            host_marker: DEFAULT_HOST_MARKER.to_string(),
            terms: DEFAULT_TERMS.iter().map(ToString::to_string).collect(),
            extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            encodings: Encoding::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl ScrubConfig {
    pub fn rules(&self) -> Rules {
        Rules {
            marker: self.marker.clone(),
            host_marker: self.host_marker.clone(),
            terms: self.terms.clone(),
            extensions: self.extensions.clone(),
            encodings: self.encodings.clone(),
        }
    }
}

/// Post-write validation. Unset lists fall back to the scrub settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// Archives smaller than this many bytes are flagged as over-trimmed.
    pub min_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            terms: None,
            extensions: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Where a package document is created when an archive has none.
    pub path: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PACKAGE_PATH.to_string(),
        }
    }
}

impl Config {
    /// `config.toml` in the platform's configuration directory, if one can be
    /// determined.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "shelfprep").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load and validate configuration.
    ///
    /// With `path`, that file must exist. Without it, the
    /// [default path](Self::default_path) is used if a file exists there.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotFound`] if `path` doesn't exist.
    /// - [`ErrorKind::UnsupportedFormat`] if the file isn't `.toml`, `.yaml`,
    ///   `.yml` or `.json`.
    /// - [`ErrorKind::Load`] if a source can't be parsed or has the wrong shape.
    /// - [`ErrorKind::Invalid`] if [`validate`](Self::validate) fails.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "loading configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase).as_deref() {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.clone())),
            };
        }
        let config: Config =
            figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR)).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize fine but can't work.
    pub fn validate(&self) -> Result<()> {
        if self.scrub.encodings.is_empty() {
            exn::bail!(ErrorKind::Invalid("scrub.encodings must not be empty".to_string()));
        }
        if self.scrub.terms.is_empty() {
            exn::bail!(ErrorKind::Invalid("scrub.terms must not be empty".to_string()));
        }
        Scrubber::new(&self.scrub.rules()).or_raise(|| ErrorKind::Invalid("scrub patterns".to_string()))?;
        if self.validate_terms().is_empty() {
            exn::bail!(ErrorKind::Invalid("validate.terms must not be empty".to_string()));
        }
        for term in self.validate_terms() {
            regex::Regex::new(term).or_raise(|| ErrorKind::Invalid(format!("validate.terms: {term}")))?;
        }
        let path = self.package.path.trim();
        if path.is_empty() || path.starts_with('/') || !path.to_ascii_lowercase().ends_with(".opf") {
            exn::bail!(ErrorKind::Invalid(format!(
                "package.path must be a relative path ending in .opf, got {:?}",
                self.package.path
            )));
        }
        Ok(())
    }

    /// Terms the validator looks for.
    pub fn validate_terms(&self) -> &[String] {
        self.validate.terms.as_deref().unwrap_or(&self.scrub.terms)
    }

    /// Extensions of members the validator checks.
    pub fn validate_extensions(&self) -> &[String] {
        self.validate.extensions.as_deref().unwrap_or(&self.scrub.extensions)
    }
}
