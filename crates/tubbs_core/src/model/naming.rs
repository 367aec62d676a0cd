//! Class name and collection name derivation.
//!
//! Only the handful of English plural rules needed for collection names are
//! covered; irregular nouns keep the regular `s` suffix.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static WORD_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[-_\s]+)([A-Za-z0-9])").expect("valid word start regex"));
static SIBILANT_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:s|x|z|ch|sh)$").expect("valid sibilant regex"));
static CONSONANT_Y_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^aeiou]y$").expect("valid consonant-y regex"));

/// Converts `user_account` / `user-account` / `userAccount` to `UserAccount`.
pub fn camelize(raw: &str) -> String {
    WORD_START_RE
        .replace_all(raw.trim(), |caps: &Captures<'_>| caps[1].to_uppercase())
        .into_owned()
}

/// Pluralizes one English word.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if CONSONANT_Y_SUFFIX_RE.is_match(word) {
        // `y` is ASCII, so the byte slice ends on a char boundary.
        return format!("{}ies", &word[..word.len() - 1]);
    }
    if SIBILANT_SUFFIX_RE.is_match(word) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Collection name for a raw class name, e.g. `category` -> `Categories`.
pub fn collection_name(raw_class_name: &str) -> String {
    pluralize(&camelize(raw_class_name))
}

#[cfg(test)]
mod tests {
    use super::{camelize, collection_name, pluralize};

    #[test]
    fn camelize_handles_separators_and_existing_case() {
        assert_eq!(camelize("user_account"), "UserAccount");
        assert_eq!(camelize("race-car"), "RaceCar");
        assert_eq!(camelize("userAccount"), "UserAccount");
        assert_eq!(camelize("  post "), "Post");
    }

    #[test]
    fn pluralize_covers_regular_rules() {
        assert_eq!(pluralize("User"), "Users");
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Day"), "Days");
        assert_eq!(pluralize("Box"), "Boxes");
        assert_eq!(pluralize("Match"), "Matches");
        assert_eq!(pluralize(""), "");
    }

    #[test]
    fn collection_name_camelizes_then_pluralizes() {
        assert_eq!(collection_name("blog_entry"), "BlogEntries");
    }
}
