use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Folder name used when neither a series nor a title survives slugifying.
pub const UNTITLED_FOLDER: &str = "Untitled";

// Characters that are invalid in Windows paths.
regex!(UNSAFE_PATH_CHARS_REGEX, r#"[\\/:*?"<>|]+"#);
regex!(WHITESPACE_REGEX, r"\s+");
