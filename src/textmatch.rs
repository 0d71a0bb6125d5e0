use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

const LIGATURES: &[(char, &str)] = &[
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb00}', "ff"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
];

fn hyphen_break_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"-\s*\n\s*").expect("valid hyphen-break pattern"))
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Canonicalize text for comparison: expand ligatures, rejoin words
/// hyphenated across line breaks, collapse whitespace, lowercase.
/// Comparison only, never display.
pub fn normalize_text_for_matching(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut expanded = text.to_string();
    for (ligature, replacement) in LIGATURES {
        if expanded.contains(*ligature) {
            expanded = expanded.replace(*ligature, replacement);
        }
    }

    let dehyphenated = hyphen_break_regex().replace_all(&expanded, "");
    let collapsed = whitespace_regex().replace_all(&dehyphenated, " ");

    collapsed.trim().to_lowercase()
}

pub const FUZZY_MATCH_THRESHOLD: f64 = 0.85;

/// Whether `needle` is present in `haystack` under normalization, or (for
/// needles of at least three words) whether enough of the needle's word set
/// appears anywhere in the haystack. The multi-word restriction keeps single
/// common words from matching everywhere.
pub fn fuzzy_text_exists(needle: &str, haystack: &str, threshold: f64) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }

    let norm_needle = normalize_text_for_matching(needle);
    let norm_haystack = normalize_text_for_matching(haystack);
    if norm_needle.is_empty() || norm_haystack.is_empty() {
        return false;
    }

    if norm_haystack.contains(&norm_needle) {
        return true;
    }

    let needle_words: HashSet<&str> = norm_needle.split(' ').collect();
    if needle_words.len() >= 3 {
        let haystack_words: HashSet<&str> = norm_haystack.split(' ').collect();
        let overlap = needle_words
            .iter()
            .filter(|word| haystack_words.contains(*word))
            .count();
        if overlap as f64 / needle_words.len() as f64 >= threshold {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_expands_ligatures_and_lowercases() {
        assert_eq!(
            normalize_text_for_matching("E\u{fb00}ective O\u{fb03}ce"),
            "effective office"
        );
    }

    #[test]
    fn normalize_rejoins_hyphenated_line_breaks() {
        assert_eq!(
            normalize_text_for_matching("termi-\n nation notice"),
            "termination notice"
        );
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_text_for_matching("  Net\t30 \n days  "),
            "net 30 days"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Payment due upon re-\nceipt of invoice",
            "E\u{fb00}ective Date:  January 1,\n2024",
            "",
            "   \n\t ",
        ];
        for sample in samples {
            let once = normalize_text_for_matching(sample);
            assert_eq!(normalize_text_for_matching(&once), once);
        }
    }

    #[test]
    fn fuzzy_rejects_empty_inputs() {
        assert!(!fuzzy_text_exists("", "some text", FUZZY_MATCH_THRESHOLD));
        assert!(!fuzzy_text_exists("needle", "", FUZZY_MATCH_THRESHOLD));
    }

    #[test]
    fn fuzzy_finds_normalized_substring() {
        let haystack = "This Agreement shall be gov-\nerned by the laws of Delaware.";
        assert!(fuzzy_text_exists(
            "governed by the laws",
            haystack,
            FUZZY_MATCH_THRESHOLD
        ));
    }

    #[test]
    fn fuzzy_substring_branch_is_sound_for_contained_needles() {
        let haystack = "The initial term commences on the Effective Date.";
        // Any needle literally contained after normalization must match.
        for needle in ["initial term", "EFFECTIVE DATE", "commences on the"] {
            assert!(fuzzy_text_exists(needle, haystack, FUZZY_MATCH_THRESHOLD));
        }
    }

    #[test]
    fn fuzzy_word_overlap_tolerates_reordering() {
        let needle = "thirty days written notice required";
        let haystack = "Notice: written notice of thirty (30) days is required to terminate.";
        assert!(fuzzy_text_exists(needle, haystack, FUZZY_MATCH_THRESHOLD));
    }

    #[test]
    fn fuzzy_single_word_needle_needs_exact_presence() {
        assert!(!fuzzy_text_exists(
            "indemnification",
            "liability cap of $1,000,000",
            FUZZY_MATCH_THRESHOLD
        ));
    }

    #[test]
    fn fuzzy_below_threshold_overlap_fails() {
        let needle = "alpha beta gamma delta epsilon";
        let haystack = "alpha beta unrelated words here";
        assert!(!fuzzy_text_exists(needle, haystack, FUZZY_MATCH_THRESHOLD));
    }
}
