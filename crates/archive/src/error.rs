//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. See `ERRORS.md` for design rationale.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is not a readable zip container. Don't retry with the same input.
    #[display("invalid or corrupted zip container")]
    InvalidArchive,
    /// A member could not be decompressed (bad checksum, truncated data, or an
    /// unsupported compression method).
    #[display("failed to decompress member: {_0}")]
    Decompress(#[error(not(source))] String),
    /// Two members share the same path.
    #[display("duplicate member: {_0}")]
    DuplicateMember(#[error(not(source))] String),
    /// Building the output container failed.
    #[display("failed to write zip container")]
    Write,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Everything here is in-memory; the bytes are either valid or they're not.
        false
    }
}
