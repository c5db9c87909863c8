//! Publisher boilerplate and trademark scrubbing.
//!
//! Text members of an EPUB (markup, stylesheets, navigation and package
//! documents) are decoded, scrubbed with a [`Scrubber`] and re-encoded as
//! UTF-8. Everything else passes through untouched, and so does any text
//! member that can't be decoded: scrubbing fails open rather than risk
//! mangling a member it doesn't understand.

mod consts;
mod encoding;
pub mod error;
mod scrubber;

pub use crate::consts::{DEFAULT_HOST_MARKER, DEFAULT_MARKER, DEFAULT_TERMS, DEFAULT_TEXT_EXTENSIONS};
pub use crate::encoding::{Encoding, decode_first};
pub use crate::scrubber::{Rules, Scrubbed, Scrubber};
