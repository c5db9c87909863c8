//! Package Document Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. See `ERRORS.md` for design rationale.

use derive_more::{Display, Error};

/// A package document error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package document operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The XML is too broken to recover anything from, even leniently.
    #[display("malformed XML: {_0}")]
    MalformedXml(#[error(not(source))] String),
    /// Serializing the document back to bytes failed.
    #[display("failed to serialize package document")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A document is either recoverable or it isn't; retrying won't change that.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::MalformedXml("no root element".to_string()).to_string(), "malformed XML: no root element");
        assert_eq!(ErrorKind::Serialize.to_string(), "failed to serialize package document");
    }
}
