use regex::Regex;
use tracing::info;

use crate::model::{Page, SectionBoundary};

/// Structural heading shapes that mark section starts in contracts:
/// "ARTICLE IV", "SECTION 3.", "1. DEFINITIONS", exhibit/schedule/appendix/
/// annex identifiers and "PART II".
const SECTION_MARKERS: &[&str] = &[
    r"(?mi)^ARTICLE\s+[IVX\d]+\.?",
    r"(?mi)^SECTION\s+\d+\.?",
    r"(?mi)^\d+\.\s+[A-Z][A-Z\s]{3,}$",
    r"(?mi)^EXHIBIT\s+[A-Z\d]+",
    r"(?mi)^SCHEDULE\s+[A-Z\d]+",
    r"(?mi)^APPENDIX\s+[A-Z\d]+",
    r"(?mi)^ANNEX\s+[A-Z\d]+",
    r"(?mi)^PART\s+[IVX\d]+",
];

/// Page separator width in the concatenated document text.
pub const PAGE_SEPARATOR_LEN: usize = 2;

/// Scan every page against every marker pattern and record each match at
/// its absolute offset in the concatenated document. Overlapping patterns
/// may both fire; no deduplication. Output sorted by offset.
pub fn detect_section_boundaries(pages: &[Page]) -> Vec<SectionBoundary> {
    let patterns: Vec<Regex> = SECTION_MARKERS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid section marker pattern"))
        .collect();

    let mut boundaries = Vec::new();
    let mut total_offset = 0usize;

    for page in pages {
        for pattern in &patterns {
            for found in pattern.find_iter(&page.text) {
                boundaries.push(SectionBoundary {
                    page: page.page_number,
                    title: found.as_str().trim().to_string(),
                    char_offset: total_offset + found.start(),
                });
            }
        }
        total_offset += page.text.len() + PAGE_SEPARATOR_LEN;
    }

    boundaries.sort_by_key(|boundary| boundary.char_offset);

    if !boundaries.is_empty() {
        info!(count = boundaries.len(), "detected section boundaries");
    }

    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: usize, text: &str) -> Page {
        Page {
            page_number: number,
            text: text.to_string(),
        }
    }

    #[test]
    fn detects_common_heading_shapes() {
        let pages = vec![page(
            1,
            "ARTICLE I\nsome text\nSECTION 2.\nmore\nEXHIBIT A\nPART IV\n1. DEFINITIONS",
        )];

        let titles: Vec<String> = detect_section_boundaries(&pages)
            .into_iter()
            .map(|boundary| boundary.title)
            .collect();

        assert!(titles.contains(&"ARTICLE I".to_string()));
        assert!(titles.contains(&"SECTION 2.".to_string()));
        assert!(titles.contains(&"EXHIBIT A".to_string()));
        assert!(titles.contains(&"PART IV".to_string()));
        assert!(titles.contains(&"1. DEFINITIONS".to_string()));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let pages = vec![page(1, "Article iii\nbody")];
        let boundaries = detect_section_boundaries(&pages);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].title, "Article iii");
    }

    #[test]
    fn offsets_accumulate_page_lengths_plus_separator() {
        let first = "no markers here";
        let pages = vec![page(1, first), page(2, "ARTICLE II\nbody")];

        let boundaries = detect_section_boundaries(&pages);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].page, 2);
        assert_eq!(boundaries[0].char_offset, first.len() + PAGE_SEPARATOR_LEN);
    }

    #[test]
    fn output_is_sorted_by_offset() {
        let pages = vec![
            page(1, "SECTION 1.\ntext\nSECTION 2.\ntext"),
            page(2, "ARTICLE I\ntext"),
        ];

        let boundaries = detect_section_boundaries(&pages);
        let offsets: Vec<usize> = boundaries.iter().map(|b| b.char_offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        assert_eq!(offsets, sorted);
        assert_eq!(boundaries.len(), 3);
    }

    #[test]
    fn plain_prose_yields_no_boundaries() {
        let pages = vec![page(1, "This agreement has no numbered headings at all.")];
        assert!(detect_section_boundaries(&pages).is_empty());
    }
}
