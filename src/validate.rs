//! Post-write validation.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use regex::{RegexSet, RegexSetBuilder};
use shelfprep_archive::Archive;
use shelfprep_config::{Config, DEFAULT_MIN_SIZE};
use shelfprep_scrub::{DEFAULT_TERMS, DEFAULT_TEXT_EXTENSIONS};
use std::collections::HashSet;
use tracing::instrument;

/// Something the caller may want to act on. Never fatal by itself.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Issue {
    /// A text member still contains a trademark term.
    #[display("trademark term remains in member: {_0}")]
    TermRemains(String),
    /// The archive can't be opened at all.
    #[display("archive could not be opened: {_0}")]
    Unreadable(String),
    /// The archive is so small that scrubbing probably removed too much.
    #[display("archive is only {size} bytes (minimum {min_size}); possible over-trim")]
    TooSmall { size: usize, min_size: usize },
}

/// Result of [`Validator::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Validation {
    /// `true` exactly when there are no issues.
    pub compliant: bool,
    pub issues: Vec<Issue>,
}

impl Validation {
    fn from_issues(issues: Vec<Issue>) -> Self {
        Self {
            compliant: issues.is_empty(),
            issues,
        }
    }
}

/// Re-checks a rewritten archive for leftover trademark terms and gross size
/// anomalies.
///
/// Scanning is first-failure-wins: the first text member (in archive order)
/// with a remaining term is reported and the rest are not looked at.
#[derive(Clone, Debug)]
pub struct Validator {
    terms: RegexSet,
    extensions: HashSet<String>,
    min_size: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&DEFAULT_TERMS, &DEFAULT_TEXT_EXTENSIONS, DEFAULT_MIN_SIZE).expect("default terms are valid")
    }
}

impl Validator {
    /// `terms` are case-insensitive regular expressions.
    pub fn new(terms: &[impl AsRef<str>], extensions: &[impl AsRef<str>], min_size: usize) -> Result<Self> {
        let terms = RegexSetBuilder::new(terms.iter().map(AsRef::as_ref))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .or_raise(|| ErrorKind::Config)?;
        Ok(Self {
            terms,
            extensions: extensions
                .iter()
                .map(|extension| extension.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            min_size,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.validate_terms(), config.validate_extensions(), config.validate.min_size)
    }

    /// Classify `bytes` as compliant or not. Never fails: an unreadable
    /// archive is itself an issue.
    #[instrument(skip_all, fields(size = bytes.len(), compliant))]
    pub fn validate(&self, bytes: &[u8]) -> Validation {
        let mut issues = Vec::new();
        match Archive::open(bytes) {
            Ok(archive) => issues.extend(self.first_remaining_term(&archive)),
            Err(err) => issues.push(Issue::Unreadable((*err).to_string())),
        }
        if bytes.len() < self.min_size {
            issues.push(Issue::TooSmall {
                size: bytes.len(),
                min_size: self.min_size,
            });
        }
        for issue in &issues {
            tracing::warn!(%issue, "validation issue");
        }
        let validation = Validation::from_issues(issues);
        tracing::Span::current().record("compliant", validation.compliant);
        validation
    }

    fn first_remaining_term(&self, archive: &Archive) -> Option<Issue> {
        archive
            .members()
            .iter()
            .filter(|member| member.extension().is_some_and(|extension| self.extensions.contains(&extension)))
            .find(|member| self.terms.is_match(&String::from_utf8_lossy(member.data())))
            .map(|member| Issue::TermRemains(member.name().to_string()))
    }
}
