//! Text normalization applied during ingest and indexing.

use regex::Regex;
use std::sync::LazyLock;

static AGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+)\([0-9]{1,2}\+\)$").expect("age marker regex"));

/// Lowercases ASCII A-Z and Cyrillic А-Я; leaves everything else alone.
fn fold_lower(c: char) -> char {
    match c {
        'A'..='Z' => c.to_ascii_lowercase(),
        'А'..='Я' => char::from_u32(c as u32 + 0x20).unwrap_or(c),
        _ => c,
    }
}

/// Normalizes a channel display name into its stored, search-ready form.
///
/// Case-folds ASCII and Cyrillic uppercase, replaces every character that is
/// not an ASCII lowercase letter, an ASCII digit, or a codepoint >= 128 with
/// a space, collapses runs of spaces and trims the ends.
pub fn fts_ready_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        let c = fold_lower(c);
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || (c as u32) >= 128;
        if keep {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Preprocessing for the legacy full-text tokenizer: case-fold ASCII and
/// Cyrillic А-Я, and fold ё into е.
pub fn legacy_fold(text: &str) -> String {
    text.chars()
        .map(|c| match fold_lower(c) {
            'ё' | 'Ё' => 'е',
            folded => folded,
        })
        .collect()
}

/// Strips a trailing `(NN+)` age-rating marker from a programme title.
///
/// Titles ending in the literal `(18+)` are kept verbatim so adult-rated
/// slots stay recognizable.
pub fn strip_age_marker(title: &str) -> String {
    if title.is_empty() || title.ends_with("(18+)") {
        return title.to_string();
    }
    match AGE_MARKER.captures(title) {
        Some(caps) => caps[1].trim().to_string(),
        None => title.to_string(),
    }
}

/// Clips `text` to at most `limit` Unicode scalar values.
///
/// Returns the (possibly clipped) text and how many scalars were removed.
pub fn clip_chars(text: &str, limit: usize) -> (String, usize) {
    let total = text.chars().count();
    if total <= limit {
        return (text.to_string(), 0);
    }
    (text.chars().take(limit).collect(), total - limit)
}
