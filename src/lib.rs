//! EPUB metadata normalization and boilerplate sanitization.
//!
//! [`Engine::process`] takes the bytes of one EPUB plus a [`MetadataRecord`]
//! and returns a rewritten EPUB:
//!
//! 1. Text members have distributor boilerplate scrubbed (see
//!    [`shelfprep_scrub`]). Members that can't be decoded are left untouched.
//! 2. The package document is located, or synthesized when missing, and its
//!    metadata normalized: single-valued fields are only filled when empty and
//!    multi-valued fields are unioned (see [`shelfprep_opf`]).
//! 3. The result is re-checked by a [`Validator`] for leftover trademark terms
//!    and suspicious size.
//!
//! Every member the engine didn't change is copied with identical bytes.

mod consts;
mod engine;
pub mod error;
mod folder;
mod validate;

pub use crate::engine::{Embedded, Engine, MetadataRecord, Processed};
pub use crate::folder::{series_folder, slugify};
pub use crate::validate::{Issue, Validation, Validator};
pub use shelfprep_config::{Config, DEFAULT_MIN_SIZE};
pub use {shelfprep_archive, shelfprep_config, shelfprep_opf, shelfprep_scrub};
