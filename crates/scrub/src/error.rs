//! Scrubbing Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. See `ERRORS.md` for design rationale.

use derive_more::{Display, Error};

/// A scrubbing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scrubbing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configured pattern is not a valid regular expression. Fix the
    /// configuration.
    #[display("invalid scrub pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// The named text encoding is not supported.
    #[display("unsupported encoding: {_0}")]
    UnsupportedEncoding(#[error(not(source))] String),
    /// Rebuilding the archive with scrubbed members failed.
    #[display("failed to rebuild archive")]
    Archive,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
