//! Case folding and character-window helpers for the substring index.
//!
//! All indexed text (names and paths) is folded at write time and queries
//! are folded identically at read time, which is what makes matching
//! case-insensitive. Folding is ASCII lowercase plus simple Unicode
//! lowercasing; no NFKC or other normalization is performed.

/// Case-fold a string for indexing or querying.
pub fn fold(s: &str) -> String {
    s.to_lowercase()
}

/// All overlapping 2-character windows of a folded string, with their
/// character positions. Empty when the string is shorter than 2 chars.
pub fn bigrams(folded: &str) -> Vec<(usize, String)> {
    let chars: Vec<char> = folded.chars().collect();
    if chars.len() < 2 {
        return Vec::new();
    }
    chars
        .windows(2)
        .enumerate()
        .map(|(pos, w)| (pos, w.iter().collect()))
        .collect()
}

/// Escape `%`, `_` and `\` so a string can be embedded in a LIKE pattern
/// with `ESCAPE '\'`.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Quote a token as an FTS5 phrase query. Embedded double quotes are
/// doubled per the FTS5 string syntax.
pub fn fts_phrase(token: &str) -> String {
    format!("\"{}\"", token.replace('"', "\"\""))
}
