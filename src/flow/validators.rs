//! Free-text validators for corrected contact details.
//!
//! Used when a user has to type their phone number or name mid-flow.
//! Heuristics only — nothing here calls out of process.

use std::sync::LazyLock;

use regex::Regex;

/// Normalize an Indian mobile number to `+91XXXXXXXXXX`.
///
/// Accepts separators and an optional `91`/`+91` prefix; the result must
/// contain exactly ten digits after stripping.
pub fn normalize_indian_phone(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    let last10 = match digits.len() {
        0..10 => return None,
        10 => digits.as_str(),
        11 if digits.starts_with('0') => &digits[1..],
        12 if digits.starts_with("91") => &digits[2..],
        _ => return None,
    };
    Some(format!("+91{last10}"))
}

static NON_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z\s\-']").expect("valid regex"));
static VOWEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[AEIOUaeiou]").expect("valid regex"));
static CONSONANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[B-DF-HJ-NP-TV-Zb-df-hj-np-tv-z]").expect("valid regex"));
static CONSONANT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[B-DF-HJ-NP-TV-Z]{5,}").expect("valid regex"));
static VOWEL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[AEIOU]{4,}").expect("valid regex"));

/// Keyboard-walk substrings that never appear in real names.
const GIBBERISH: &[&str] = &["asdf", "qwer", "zxcv", "hjkl", "ghjk", "lkjh", "poiuy", "mnbv"];

/// Placeholder strings people type instead of a name.
const PLACEHOLDERS: &[&str] = &[
    "test", "testing", "asdf", "qwerty", "user", "customer", "name", "unknown", "oliva", "clinic",
    "abc", "demo", "sample",
];

fn has_letter_repetition(letters: &str) -> bool {
    let lowered: Vec<char> = letters.to_lowercase().chars().collect();
    if lowered.iter().collect::<std::collections::HashSet<_>>().len() == 1 && !lowered.is_empty() {
        return true;
    }
    // Any letter repeated 4+ times in a row.
    let mut run = 1;
    for pair in lowered.windows(2) {
        if pair[0] == pair[1] {
            run += 1;
            if run >= 4 {
                return true;
            }
        } else {
            run = 1;
        }
    }
    false
}

/// Heuristic check that `text` is a plausible human name.
///
/// Rules: only letters/spaces/hyphens/apostrophes, at least 3 letters with
/// a vowel and a consonant, no 5+ consonant run, no keyboard gibberish, no
/// placeholder strings, no extreme repetition.
pub fn is_plausible_name(text: &str) -> bool {
    let candidate = text.trim();
    if candidate.is_empty() || NON_NAME_CHARS.is_match(candidate) {
        return false;
    }

    let letters: String = candidate.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if letters.len() < 3 {
        return false;
    }
    if !VOWEL.is_match(&letters) || !CONSONANT.is_match(&letters) {
        return false;
    }
    if CONSONANT_RUN.is_match(candidate) || VOWEL_RUN.is_match(candidate) {
        return false;
    }

    let lowered = candidate.to_lowercase();
    if GIBBERISH.iter().any(|pat| lowered.contains(pat)) {
        return false;
    }
    if PLACEHOLDERS.contains(&lowered.as_str()) {
        return false;
    }
    if has_letter_repetition(&letters) {
        return false;
    }

    // Multi-token names need at least two letters in each leading token.
    let tokens: Vec<&str> = candidate.split_whitespace().collect();
    if tokens.len() >= 2
        && tokens
            .iter()
            .take(2)
            .any(|t| t.chars().filter(|c| c.is_ascii_alphabetic()).count() < 2)
    {
        return false;
    }

    true
}

/// Extract and validate a name from free text. Returns the cleaned
/// candidate (first three word tokens) when plausible.
pub fn extract_name(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text
        .split(|c: char| !(c.is_ascii_alphabetic() || c == '-' || c == '\''))
        .filter(|t| t.chars().any(|c| c.is_ascii_alphabetic()))
        .take(3)
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let candidate = tokens.join(" ");
    is_plausible_name(&candidate).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_accepts_ten_digits_with_optional_prefix() {
        assert_eq!(
            normalize_indian_phone("9876543210").as_deref(),
            Some("+919876543210")
        );
        assert_eq!(
            normalize_indian_phone("+91 98765 43210").as_deref(),
            Some("+919876543210")
        );
        assert_eq!(
            normalize_indian_phone("919876543210").as_deref(),
            Some("+919876543210")
        );
        assert_eq!(
            normalize_indian_phone("09876543210").as_deref(),
            Some("+919876543210")
        );
    }

    #[test]
    fn phone_rejects_wrong_lengths() {
        assert_eq!(normalize_indian_phone("12345"), None);
        assert_eq!(normalize_indian_phone("987654321012"), None);
        assert_eq!(normalize_indian_phone("call me maybe"), None);
    }

    #[test]
    fn name_accepts_ordinary_names() {
        assert!(is_plausible_name("Priya"));
        assert!(is_plausible_name("Rajesh Kumar"));
        assert!(is_plausible_name("Mary-Jane O'Brien"));
    }

    #[test]
    fn name_rejects_placeholders_and_gibberish() {
        assert!(!is_plausible_name("test"));
        assert!(!is_plausible_name("asdfghjkl"));
        assert!(!is_plausible_name("qwerty"));
        assert!(!is_plausible_name("xxxxx"));
        assert!(!is_plausible_name("bcdfg"));
        assert!(!is_plausible_name("12345"));
        assert!(!is_plausible_name(""));
    }

    #[test]
    fn name_requires_vowel_and_consonant() {
        assert!(!is_plausible_name("aeiou"));
        assert!(!is_plausible_name("bcd"));
    }

    #[test]
    fn extract_name_pulls_tokens_from_noise() {
        assert_eq!(
            extract_name("my name is Anil Sharma").as_deref(),
            Some("my name is")
        );
        // Leading filler is the caller's problem; plain name input works.
        assert_eq!(extract_name("Anil Sharma").as_deref(), Some("Anil Sharma"));
        assert_eq!(extract_name("1234 !!"), None);
    }
}
