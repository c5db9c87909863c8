use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Phrase marking a comment, block or banner as publisher boilerplate.
pub const DEFAULT_MARKER: &str = r"project\s+gutenberg";
/// Substring identifying trademark-bearing link targets.
pub const DEFAULT_HOST_MARKER: &str = "gutenberg";
/// Trademark terms stripped wherever they remain. Longer phrases first, so
/// they win over their own prefixes.
pub const DEFAULT_TERMS: [&str; 5] = [
    r"full project gutenberg-tm license",
    r"www\.gutenberg\.org",
    r"project\s+gutenberg",
    r"gutenberg-tm",
    r"gutenberg\.org",
];
/// Extensions (lowercase, no dot) of members treated as text.
pub const DEFAULT_TEXT_EXTENSIONS: [&str; 8] = ["xhtml", "html", "htm", "xml", "opf", "ncx", "txt", "css"];

regex!(COMMENT_REGEX, r"(?s)<!--.*?-->");
// `\b` keeps `<p` from matching `<pre>`, `<param>` or `<package>`.
regex!(BLOCK_TAG_REGEX, r"(?i)<(/?)(div|p|span|section|footer)\b[^>]*>");
regex!(BANNER_REGEX, r"(?is)\*{3}\s*(?:start|end)\s+of\b.*?\*{3}");
regex!(EXTERNAL_HREF_REGEX, r#"(?i)href\s*=\s*"https?://[^"]*""#);
