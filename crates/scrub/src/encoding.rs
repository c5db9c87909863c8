//! Text decoding for member contents.
//!
//! Only the encodings older EPUBs actually turn up in are supported. Output is
//! always re-encoded as UTF-8.

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::borrow::Cow;
use std::str::FromStr;

/// Windows-1252 code points for bytes `0x80..=0x9F`; `None` where undefined.
const WINDOWS_1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// A character encoding a text member may be decoded with.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Encoding {
    #[display("utf-8")]
    #[cfg_attr(feature = "serde", serde(rename = "utf-8", alias = "utf8"))]
    Utf8,
    /// Strict: the five bytes Windows-1252 leaves undefined fail to decode.
    #[display("windows-1252")]
    #[cfg_attr(feature = "serde", serde(rename = "windows-1252", alias = "cp1252"))]
    Windows1252,
    /// Every byte sequence is valid ISO-8859-1, so this never fails.
    #[display("latin-1")]
    #[cfg_attr(feature = "serde", serde(rename = "latin-1", alias = "iso-8859-1"))]
    Latin1,
}

impl Encoding {
    /// The order encodings are attempted in when none is configured.
    pub const DEFAULT_ORDER: [Encoding; 3] = [Encoding::Utf8, Encoding::Windows1252, Encoding::Latin1];

    /// Decode `bytes`, or `None` if they aren't valid in this encoding.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Encoding::Windows1252 => bytes
                .iter()
                .map(|&byte| match byte {
                    0x80..=0x9F => WINDOWS_1252_HIGH[usize::from(byte - 0x80)],
                    _ => Some(char::from(byte)),
                })
                .collect::<Option<String>>()
                .map(Cow::Owned),
            Encoding::Latin1 => Some(Cow::Owned(bytes.iter().map(|&byte| char::from(byte)).collect())),
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "windows-1252" | "cp1252" => Ok(Encoding::Windows1252),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            _ => exn::bail!(ErrorKind::UnsupportedEncoding(s.to_string())),
        }
    }
}

/// Decode with the first of `encodings` that succeeds.
pub fn decode_first<'a>(bytes: &'a [u8], encodings: &[Encoding]) -> Option<(Encoding, Cow<'a, str>)> {
    encodings.iter().find_map(|encoding| encoding.decode(bytes).map(|text| (*encoding, text)))
}
