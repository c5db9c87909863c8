//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. See `ERRORS.md` for design rationale.
//!
//! Each kind names the stage that failed; the crate-level error it was raised
//! from is kept as its child.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input isn't a usable zip container, or rebuilding it failed. No
    /// output was produced; skip this input.
    #[display("archive could not be read or rebuilt")]
    Archive,
    /// The package document is beyond lenient recovery. No output was
    /// produced; skip this input.
    #[display("package document could not be processed")]
    Package,
    /// Boilerplate scrubbing failed.
    #[display("boilerplate scrubbing failed")]
    Scrub,
    /// The engine configuration is unusable. Fix the configuration.
    #[display("invalid engine configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The engine is pure: the same input fails the same way every time.
        // Callers retry by fetching fresh bytes, not by calling again.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Archive.to_string(), "archive could not be read or rebuilt");
        assert_eq!(ErrorKind::Package.to_string(), "package document could not be processed");
        assert!(!ErrorKind::Scrub.is_retryable());
    }
}
