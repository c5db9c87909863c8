use crate::consts::{
    BANNER_REGEX, BLOCK_TAG_REGEX, COMMENT_REGEX, DEFAULT_HOST_MARKER, DEFAULT_MARKER, DEFAULT_TERMS,
    DEFAULT_TEXT_EXTENSIONS, EXTERNAL_HREF_REGEX,
};
use crate::encoding::{Encoding, decode_first};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::{Captures, Regex, RegexBuilder};
use shelfprep_archive::{Archive, extension};
use std::collections::HashSet;
use tracing::instrument;

/// What a [`Scrubber`] should remove, and from which members.
///
/// Patterns are regular expressions, matched case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rules {
    /// Phrase whose presence marks a comment, block or banner as boilerplate.
    pub marker: String,
    /// Links whose target matches this are neutralized.
    pub host_marker: String,
    /// Stripped wherever they still appear after the structural rules.
    pub terms: Vec<String>,
    /// Extensions of text members, lowercase without the dot.
    pub extensions: Vec<String>,
    /// Attempted in order; the first that decodes a member wins.
    pub encodings: Vec<Encoding>,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            host_marker: DEFAULT_HOST_MARKER.to_string(),
            terms: DEFAULT_TERMS.iter().map(ToString::to_string).collect(),
            extensions: DEFAULT_TEXT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            encodings: Encoding::DEFAULT_ORDER.to_vec(),
        }
    }
}

/// Outcome of scrubbing a single member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scrubbed {
    /// A text member, scrubbed and re-encoded as UTF-8. May equal the input.
    Cleaned(Vec<u8>),
    /// Not a text member; left alone.
    Skipped,
    /// A text member none of the configured encodings could decode; left alone.
    DecodeSkipped,
}

/// Compiled boilerplate rules.
///
/// Scrubbing is best-effort pattern removal, not markup-aware editing: it can
/// miss rephrased boilerplate, and it can remove legitimate prose that happens
/// to mention a term. Rules are applied in order, repeatedly, until the text
/// stops changing:
///
/// 1. normalize line endings to `\n`;
/// 2. drop comments mentioning the marker;
/// 3. drop the innermost `div`/`p`/`span`/`section`/`footer` blocks mentioning
///    the marker (an enclosing block only goes if it *still* mentions it);
/// 4. drop `*** START OF … ***` / `*** END OF … ***` banners mentioning the
///    marker;
/// 5. point external links at matching hosts to `#`;
/// 6. strip every remaining term;
/// 7. trim surrounding whitespace.
///
/// Because the result is a fixpoint, scrubbing already-scrubbed text is a no-op.
#[derive(Clone, Debug)]
pub struct Scrubber {
    marker: Regex,
    host_marker: Regex,
    terms: Option<Regex>,
    extensions: HashSet<String>,
    encodings: Vec<Encoding>,
}

impl Default for Scrubber {
    fn default() -> Self {
        Self::new(&Rules::default()).expect("default scrub rules are valid")
    }
}

impl Scrubber {
    /// Compile `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPattern`](ErrorKind::InvalidPattern) if the marker or
    /// host marker is blank, or if any pattern fails to compile.
    pub fn new(rules: &Rules) -> Result<Self> {
        let terms = match rules.terms.is_empty() {
            true => None,
            false => {
                for term in &rules.terms {
                    pattern(term)?;
                }
                let combined = rules.terms.iter().map(|term| format!("(?:{term})")).collect::<Vec<_>>().join("|");
                Some(pattern(&combined)?)
            },
        };
        Ok(Self {
            marker: pattern(&rules.marker)?,
            host_marker: pattern(&rules.host_marker)?,
            terms,
            extensions: rules
                .extensions
                .iter()
                .map(|extension| extension.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            encodings: rules.encodings.clone(),
        })
    }

    /// Whether the member at `path` is scrubbed at all.
    pub fn is_text(&self, path: &str) -> bool {
        extension(path).is_some_and(|extension| self.extensions.contains(&extension))
    }

    /// Scrub a single member.
    ///
    /// Non-text members are [`Skipped`](Scrubbed::Skipped). Text members that
    /// no configured encoding decodes are passed over as
    /// [`DecodeSkipped`](Scrubbed::DecodeSkipped) rather than risk corrupting
    /// them.
    pub fn scrub_member(&self, path: &str, bytes: &[u8]) -> Scrubbed {
        if !self.is_text(path) {
            return Scrubbed::Skipped;
        }
        match decode_first(bytes, &self.encodings) {
            Some((encoding, text)) => {
                tracing::trace!(member = %path, %encoding, "decoded text member");
                Scrubbed::Cleaned(self.scrub_text(&text).into_bytes())
            },
            None => {
                tracing::warn!(member = %path, encodings = ?self.encodings, "cannot decode text member, leaving it unscrubbed");
                Scrubbed::DecodeSkipped
            },
        }
    }

    /// Apply every rule until the text stops changing.
    ///
    /// Terminates: a pass that changes anything either shortens the text or
    /// replaces a lone `\r`, which never reappears.
    pub fn scrub_text(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Rebuild `archive` with every text member scrubbed.
    ///
    /// Members that are not text, can't be decoded, or come out unchanged are
    /// copied exactly as they were.
    #[instrument(skip_all, fields(members = archive.len(), cleaned, undecodable))]
    pub fn scrub_archive(&self, archive: &Archive) -> Result<Vec<u8>> {
        let mut rewrite = archive.rewrite();
        let (mut cleaned, mut undecodable) = (0usize, 0usize);
        for member in archive.members().iter().filter(|member| !member.is_dir()) {
            match self.scrub_member(member.name(), member.data()) {
                Scrubbed::Cleaned(data) if data != member.data() => {
                    tracing::debug!(member = %member.name(), before = member.data().len(), after = data.len(), "scrubbed member");
                    rewrite = rewrite.replace(member.name(), data);
                    cleaned += 1;
                },
                Scrubbed::DecodeSkipped => undecodable += 1,
                Scrubbed::Cleaned(_) | Scrubbed::Skipped => {},
            }
        }
        let span = tracing::Span::current();
        span.record("cleaned", cleaned);
        span.record("undecodable", undecodable);
        rewrite.finish().or_raise(|| ErrorKind::Archive)
    }

    fn pass(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text = self.drop_marked(&COMMENT_REGEX, &text);
        let text = self.drop_marked_blocks(&text);
        let text = self.drop_marked(&BANNER_REGEX, &text);
        let text = EXTERNAL_HREF_REGEX
            .replace_all(&text, |captures: &Captures<'_>| match self.host_marker.is_match(&captures[0]) {
                true => r##"href="#""##.to_string(),
                false => captures[0].to_string(),
            })
            .into_owned();
        let text = match &self.terms {
            Some(terms) => terms.replace_all(&text, "").into_owned(),
            None => text,
        };
        text.trim().to_string()
    }

    /// Remove every match of `regex` that mentions the marker.
    fn drop_marked(&self, regex: &Regex, text: &str) -> String {
        regex
            .replace_all(text, |captures: &Captures<'_>| match self.marker.is_match(&captures[0]) {
                true => String::new(),
                false => captures[0].to_string(),
            })
            .into_owned()
    }

    /// Remove block elements whose content mentions the marker, innermost
    /// first. Removing an inner block can expose its parent as innermost.
    fn drop_marked_blocks(&self, text: &str) -> String {
        let mut current = self.drop_innermost_blocks(text);
        loop {
            let next = self.drop_innermost_blocks(&current);
            // Removal only ever shrinks the text.
            if next.len() == current.len() {
                return current;
            }
            current = next;
        }
    }

    /// An open tag followed (ignoring text) by a matching close tag is an
    /// innermost pair. Self-closing and mismatched tags are left alone.
    fn drop_innermost_blocks(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut copied = 0;
        let mut open: Option<(usize, usize, &str)> = None;
        for captures in BLOCK_TAG_REGEX.captures_iter(text) {
            let (Some(tag), Some(name)) = (captures.get(0), captures.get(2)) else {
                continue;
            };
            if tag.as_str().ends_with("/>") {
                continue;
            }
            let closing = captures.get(1).is_some_and(|slash| !slash.is_empty());
            match (closing, open.take()) {
                (false, _) => open = Some((tag.start(), tag.end(), name.as_str())),
                (true, Some((start, content, opened))) if opened.eq_ignore_ascii_case(name.as_str()) => {
                    if self.marker.is_match(&text[content..tag.start()]) {
                        output.push_str(&text[copied..start]);
                        copied = tag.end();
                    }
                },
                (true, _) => {},
            }
        }
        output.push_str(&text[copied..]);
        output
    }
}

fn pattern(pattern: &str) -> Result<Regex> {
    if pattern.trim().is_empty() {
        exn::bail!(ErrorKind::InvalidPattern("pattern must not be blank".to_string()));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .or_raise(|| ErrorKind::InvalidPattern(pattern.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use shelfprep_archive::{Compression, Member};

    #[rstest]
    #[case::marked_paragraph(
        "<body><p>Produced by the PROJECT GUTENBERG team</p><p>Call me Ishmael.</p></body>",
        "<body><p>Call me Ishmael.</p></body>"
    )]
    #[case::marked_comment(
        "<!-- Project Gutenberg header --><p>Text</p><!-- kept -->",
        "<p>Text</p><!-- kept -->"
    )]
    #[case::innermost_block_only(
        "<div><p>Story</p><span class=\"pg\">Project\nGutenberg</span></div>",
        "<div><p>Story</p></div>"
    )]
    #[case::enclosing_block_after_inner(
        "<section><p>Project Gutenberg</p>Project Gutenberg</section><p>Kept</p>",
        "<p>Kept</p>"
    )]
    #[case::pre_is_not_p("<pre>code</pre><p>A Project Gutenberg eBook</p>", "<pre>code</pre>")]
    #[case::banners(
        "*** START OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***\nCall me Ishmael.\n*** END OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***",
        "Call me Ishmael."
    )]
    #[case::unrelated_banner("*** START OF CHAPTER ONE ***", "*** START OF CHAPTER ONE ***")]
    #[case::marked_link(
        r#"<a href="https://www.gutenberg.org/ebooks/2701">the ebook</a>"#,
        r##"<a href="#">the ebook</a>"##
    )]
    #[case::unrelated_link(r#"<a href="https://example.com/">x</a>"#, r#"<a href="https://example.com/">x</a>"#)]
    #[case::bare_terms("See Gutenberg.org and gutenberg-tm.", "See  and .")]
    #[case::line_endings("one\r\ntwo\rthree", "one\ntwo\nthree")]
    #[case::surrounding_whitespace("\n\n  <p>Text</p>  \n", "<p>Text</p>")]
    #[case::nested_terms("project project gutenberg gutenberg", "")]
    #[case::banner_marker_after_close(
        "*** START OF THE EBOOK *** Call me Ishmael. Project Gutenberg ***",
        "*** START OF THE EBOOK *** Call me Ishmael.  ***"
    )]
    fn scrub_text(#[case] input: &str, #[case] expected: &str) {
        let scrubber = Scrubber::default();
        assert_eq!(scrubber.scrub_text(input), expected);
    }

    #[rstest]
    #[case("<div><div>Project <span>Gutenberg</span></div> text</div>")]
    #[case("<p>Project</p> <p>Gutenberg</p> project gutenberg-tm license")]
    #[case("<!-- <!-- Project Gutenberg --> -->\r\n*** END OF *** Project Gutenberg ***")]
    #[case("<a href=\"http://gutenberg.org\">www.gutenberg.org</a>")]
    fn scrubbing_is_idempotent(#[case] input: &str) {
        let scrubber = Scrubber::default();
        let once = scrubber.scrub_member("a.xhtml", input.as_bytes());
        let Scrubbed::Cleaned(once) = once else { panic!("expected a cleaned member") };
        assert_eq!(scrubber.scrub_member("a.xhtml", &once), Scrubbed::Cleaned(once.clone()));
    }

    #[test]
    fn deeply_nested_terms_are_fully_removed() {
        let input = format!("Call me Ishmael. {}{}", "project ".repeat(48), "gutenberg ".repeat(48));
        let scrubber = Scrubber::default();
        let once = scrubber.scrub_text(&input);
        assert_eq!(once, "Call me Ishmael.");
        assert_eq!(scrubber.scrub_text(&once), once);
    }

    #[rstest]
    #[case("OEBPS/cover.jpg")]
    #[case("mimetype")]
    #[case("OEBPS/.xhtml")]
    fn non_text_members_are_skipped(#[case] path: &str) {
        assert_eq!(Scrubber::default().scrub_member(path, b"Project Gutenberg"), Scrubbed::Skipped);
    }

    #[test]
    fn legacy_encodings_are_reencoded_as_utf8() {
        let scrubber = Scrubber::default();
        let scrubbed = scrubber.scrub_member("ch1.HTML", b"<p>caf\xE9 \x93Project Gutenberg\x94</p><p>na\xEFve</p>");
        assert_eq!(scrubbed, Scrubbed::Cleaned("<p>na\u{ef}ve</p>".as_bytes().to_vec()));
    }

    #[test]
    fn undecodable_members_fail_open() {
        let rules = Rules {
            encodings: vec![Encoding::Utf8],
            ..Rules::default()
        };
        let scrubber = Scrubber::new(&rules).unwrap();
        assert_eq!(scrubber.scrub_member("ch1.xhtml", b"<p>caf\xE9 Project Gutenberg</p>"), Scrubbed::DecodeSkipped);
    }

    #[rstest]
    #[case::blank_marker(Rules { marker: " ".to_string(), ..Rules::default() })]
    #[case::invalid_term(Rules { terms: vec!["(unclosed".to_string()], ..Rules::default() })]
    fn invalid_rules(#[case] rules: Rules) {
        let err = Scrubber::new(&rules).unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidPattern(_)));
    }

    #[test]
    fn custom_extensions_accept_leading_dots() {
        let rules = Rules {
            extensions: vec![".XHTML".to_string()],
            ..Rules::default()
        };
        let scrubber = Scrubber::new(&rules).unwrap();
        assert!(scrubber.is_text("OEBPS/ch1.xhtml"));
        assert!(!scrubber.is_text("OEBPS/style.css"));
    }

    #[test]
    fn archive_scrubbing_only_touches_text_members() {
        let cover = [0xFF, 0xD8, 0xFF, b'P', b'r', b'o', b'j', b'e', b'c', b't'];
        let archive = [
            Member::mimetype(),
            Member::new("OEBPS/ch1.xhtml", "<p>Project Gutenberg</p><p>Call me Ishmael.</p>", Compression::Deflated),
            Member::new("OEBPS/ch2.xhtml", "<p>Nothing to see.</p>", Compression::Deflated),
            Member::new("OEBPS/cover.jpg", cover.to_vec(), Compression::Stored),
        ]
        .into_iter()
        .fold(Archive::default().rewrite(), |rewrite, member| rewrite.insert(member))
        .finish()
        .unwrap();
        let archive = Archive::open(archive).unwrap();

        let scrubbed = Archive::open(Scrubber::default().scrub_archive(&archive).unwrap()).unwrap();
        assert_eq!(scrubbed.names().collect::<Vec<_>>(), archive.names().collect::<Vec<_>>());
        assert_eq!(scrubbed.get("OEBPS/ch1.xhtml").unwrap().data(), b"<p>Call me Ishmael.</p>");
        for name in ["mimetype", "OEBPS/ch2.xhtml", "OEBPS/cover.jpg"] {
            assert_eq!(scrubbed.get(name), archive.get(name));
        }
    }
}
