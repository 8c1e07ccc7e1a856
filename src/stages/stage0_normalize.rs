use std::sync::LazyLock;

use regex::Regex;

/// Non-ASCII letters that occur in transcript text alongside `A-Za-z`
pub const TURKISH_LETTERS: &str = "ÇĞİÖŞÜçğıöşüâîûÂÎÛé";

/// Regex class body covering every letter a name or word can contain
pub const LETTER_CLASS: &str = "A-Za-zÇĞİÖŞÜçğıöşüâîûÂÎÛé";

static HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\s*").expect("valid hyphen break regex"));

static POSSESSIVE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)['’]?\s*(?:nın|nin|nun|nün|ın|in|un|ün)$").expect("valid possessive suffix regex")
});

pub fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || TURKISH_LETTERS.contains(c)
}

/// Perform Stage 0: text normalization
///
/// This stage:
/// 1. Drops soft hyphens and turns non-breaking spaces into plain spaces
/// 2. Joins words split by a hyphen followed by optional whitespace or a
///    line break, but only when both neighbours are letters
///
/// Hyphens next to digits, punctuation or spaces survive, so list markers
/// such as `1 -` are left intact.
pub fn normalize_raw_text(text: &str) -> String {
    let text = text.replace('\u{00AD}', "").replace('\u{00A0}', " ");

    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in HYPHEN_BREAK.find_iter(&text) {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();

        out.push_str(&text[last..m.start()]);
        let joins_word = before.is_some_and(is_letter) && after.is_some_and(is_letter);
        if !joins_word {
            out.push_str(m.as_str());
        }
        last = m.end();
    }
    out.push_str(&text[last..]);

    out
}

/// Collapse every whitespace run into a single space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove a trailing genitive suffix (`'nın`, `in`, `'ün`, ...) from a name
pub fn strip_possessive_suffix(text: &str) -> String {
    POSSESSIVE_SUFFIX.replace(text, "").trim().to_string()
}

/// Whitespace-collapse then strip the possessive suffix
pub fn clean_name_capture(text: &str) -> String {
    strip_possessive_suffix(&collapse_whitespace(text))
}
