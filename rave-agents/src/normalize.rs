//! Name and identifier normalization used for matching and voting.

use serde_json::Value;

/// Label used when a reply carries no usable ISBN.
pub const UNKNOWN_ISBN: &str = "unknown";

/// Matching key for an artist name.
///
/// Lowercased, punctuation stripped, whitespace collapsed, and leading
/// "the"/"dj" words dropped. "DJ Surgeon" and "surgeon." share a key.
pub fn artist_key(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let mut rest = words.as_slice();
    while rest.len() > 1 && matches!(rest[0], "the" | "dj") {
        rest = &rest[1..];
    }
    rest.join(" ")
}

/// ISBN-13 form of an ISBN-10 or ISBN-13, ignoring hyphens and spaces.
/// `None` for anything else.
pub fn isbn13(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if !compact.is_ascii() {
        return None;
    }

    match compact.len() {
        13 if compact.chars().all(|c| c.is_ascii_digit()) => Some(compact),
        10 if compact[..9].chars().all(|c| c.is_ascii_digit())
            && compact[9..].chars().all(|c| c.is_ascii_digit() || c == 'X') =>
        {
            let body = format!("978{}", &compact[..9]);
            Some(format!("{}{}", body, ean_check_digit(&body)))
        }
        _ => None,
    }
}

fn ean_check_digit(twelve: &str) -> u32 {
    let sum: u32 = twelve
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    (10 - sum % 10) % 10
}

/// Voting label for a book metadata reply: its normalized ISBN.
pub fn isbn_label(payload: &Value) -> String {
    let raw = match payload.get("isbn") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return UNKNOWN_ISBN.to_string(),
    };
    isbn13(&raw).unwrap_or_else(|| UNKNOWN_ISBN.to_string())
}
