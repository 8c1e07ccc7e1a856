/// Number of leading name characters used as a speech anchor
pub const DEFAULT_PREFIX_LEN: usize = 2;

/// Letters that OCR and retyping confuse with one another. Every member of a
/// group expands to the whole group, in both cases, because case-insensitive
/// matching does not fold `İ`/`ı` onto `i`/`I`.
const CONFUSION_GROUPS: &[&str] = &[
    "cçCÇ",
    "gğGĞ",
    "iıîIİÎ",
    "oöOÖ",
    "sşSŞ",
    "uüûUÜÛ",
    "aâAÂ",
];

fn confusion_group(c: char) -> Option<&'static str> {
    CONFUSION_GROUPS.iter().copied().find(|group| group.contains(c))
}

/// Compile a fragment into a diacritic-tolerant regex source.
///
/// Example: `Öz` becomes `[oöOÖ]z`. Characters outside the confusion table
/// are escaped and matched literally; case folding for them is left to the
/// enclosing regex's `(?i)` flag.
pub fn make_flexible_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() * 6);
    for c in text.chars() {
        match confusion_group(c) {
            Some(group) => {
                pattern.push('[');
                pattern.push_str(group);
                pattern.push(']');
            }
            None => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern
}

/// First `len` characters of a name (the whole name if shorter)
pub fn name_prefix(name: &str, len: usize) -> &str {
    match name.char_indices().nth(len) {
        Some((idx, _)) => &name[..idx],
        None => name,
    }
}
