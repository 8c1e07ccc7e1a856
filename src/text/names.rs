/// Apostrophe-like characters that start trailing suffix text after a name
const APOSTROPHES: &[char] = &['\'', '\u{2019}', '\u{201B}', '`'];

/// Separators after which extraction tends to append unrelated text
const TRAILING_SEPARATORS: &[char] = &[',', ';'];

/// Turkish conjunctions that signal two names (or a name and a description)
/// were captured together
const CONJUNCTIONS: &[&str] = &["ve", "ile"];

/// Normalize a speaker name for cache keys.
///
/// Keeps only the text before the first apostrophe-like character, comma or
/// semicolon, then collapses whitespace:
/// - `Ahmet Yılmaz'ın` -> `Ahmet Yılmaz`
/// - `Mehmet Ali, Bakan` -> `Mehmet Ali`
pub fn normalize_mp_name(name: &str) -> String {
    let name = name.split(APOSTROPHES).next().unwrap_or_default();
    let name = name.split(TRAILING_SEPARATORS).next().unwrap_or_default();
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase with Turkish diacritics folded onto their ASCII base letters
pub fn fold_for_comparison(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'ç' | 'Ç' => folded.push('c'),
            'ğ' | 'Ğ' => folded.push('g'),
            'ı' | 'I' | 'İ' | 'î' | 'Î' => folded.push('i'),
            'ö' | 'Ö' => folded.push('o'),
            'ş' | 'Ş' => folded.push('s'),
            'ü' | 'Ü' | 'û' | 'Û' => folded.push('u'),
            'â' | 'Â' => folded.push('a'),
            other => folded.extend(other.to_lowercase()),
        }
    }
    folded
}

/// Similarity ratio in `[0, 1]` between two names, insensitive to case and
/// Turkish diacritics
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold_for_comparison(a), &fold_for_comparison(b))
}

/// First `n` whitespace-delimited words of a name
pub fn first_n_words(name: &str, n: usize) -> String {
    name.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Whether `ve` or `ile` appears as a standalone word
pub fn contains_conjunction_words(name: &str) -> bool {
    name.split_whitespace()
        .map(fold_for_comparison)
        .any(|word| CONJUNCTIONS.contains(&word.as_str()))
}
