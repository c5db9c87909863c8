use crate::consts::{UNSAFE_PATH_CHARS_REGEX, UNTITLED_FOLDER, WHITESPACE_REGEX};

/// Make `s` safe to use as a single path component on any platform.
///
/// Runs of path-hostile characters become a single `-`, and whitespace runs
/// collapse to a single space. Case and everything else are kept, so the
/// result still reads like the original.
pub fn slugify(s: &str) -> String {
    let s = UNSAFE_PATH_CHARS_REGEX.replace_all(s.trim(), "-");
    WHITESPACE_REGEX.replace_all(&s, " ").trim().to_string()
}

/// Folder a title is filed under: its series if it has one, else the title
/// itself (so standalone works become a series of one).
pub fn series_folder(title: &str, series: Option<&str>) -> String {
    let base = series.map(str::trim).filter(|series| !series.is_empty()).unwrap_or(title);
    match slugify(base) {
        folder if folder.is_empty() => UNTITLED_FOLDER.to_string(),
        folder => folder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Moby Dick", "Moby Dick")]
    #[case("  Moby-Dick; or, The Whale  ", "Moby-Dick; or, The Whale")]
    #[case("AC/DC: Live?", "AC-DC- Live-")]
    #[case("What <is> \"this\"|that", "What -is- -this-that")]
    #[case("a\\/:b", "a-b")]
    #[case("tabs\tand\n\nnewlines", "tabs and newlines")]
    #[case("", "")]
    fn slugify_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[rstest]
    #[case("Foundation and Empire", Some("Foundation"), "Foundation")]
    #[case("Moby Dick", None, "Moby Dick")]
    #[case("Moby Dick", Some("   "), "Moby Dick")]
    #[case("???", None, "-")]
    #[case("   ", None, "Untitled")]
    fn series_folder_cases(#[case] title: &str, #[case] series: Option<&str>, #[case] expected: &str) {
        assert_eq!(series_folder(title, series), expected);
    }
}
