//! Text normalization shared by names, titles and search input.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Trims and collapses internal whitespace runs to one space.
///
/// Returns `None` when nothing but whitespace remains.
pub fn normalize_label(value: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(value.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

/// Trims optional free text; blank values become `None`.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Case-insensitive substring test used by the list and autocomplete
/// filters.
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use super::{contains_ignore_case, normalize_label, normalize_optional};

    #[test]
    fn normalize_label_collapses_inner_whitespace() {
        assert_eq!(
            normalize_label("  The \t Long\n Night ").as_deref(),
            Some("The Long Night")
        );
        assert_eq!(normalize_label(" \n "), None);
    }

    #[test]
    fn normalize_optional_drops_blank_values() {
        assert_eq!(normalize_optional(Some("  ")), None);
        assert_eq!(normalize_optional(Some(" red ")).as_deref(), Some("red"));
        assert_eq!(normalize_optional(None), None);
    }

    #[test]
    fn contains_ignore_case_matches_mixed_case() {
        assert!(contains_ignore_case("Aragorn", "rag"));
        assert!(!contains_ignore_case("Aragorn", "xyz"));
    }
}
