use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::model::Page;

use super::boundaries::detect_section_boundaries;

/// Rough conversion from a token budget to a character budget.
pub const CHARS_PER_TOKEN: usize = 4;

const OVERLAP_HEADER: &str = "\n\n[...context from previous section...]\n";
const TRUNCATION_MARKER: &str = "\n\n[... middle section omitted due to length ...]\n\n";

fn line_break_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s*\n\s*").expect("valid line-break pattern"))
}

/// Collapse whitespace-padded line breaks and trim. Applied to each page
/// before prompting and grounding.
pub fn preprocess_page_text(text: &str) -> String {
    line_break_regex().replace_all(text, "\n").trim().to_string()
}

/// Render pages as "Page N:" blocks separated by blank lines.
pub fn format_pages_for_inference(pages: &[Page]) -> String {
    pages
        .iter()
        .map(|page| format!("Page {}:\n{}", page.page_number, page.text))
        .collect::<Vec<String>>()
        .join("\n\n")
}

/// Keep the first 60% and last 40% of the budget when text exceeds it,
/// joined by an elision marker. Returns whether truncation happened.
pub fn smart_truncate(text: &str, max_chars: usize) -> (String, bool) {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return (text.to_string(), false);
    }

    let first_part = max_chars * 6 / 10;
    let last_part = max_chars * 4 / 10;

    let head: String = text.chars().take(first_part).collect();
    let tail: String = text
        .chars()
        .skip(char_count.saturating_sub(last_part))
        .collect();

    let truncated = format!("{head}{TRUNCATION_MARKER}{tail}");
    warn!(
        original_chars = char_count,
        truncated_chars = truncated.chars().count(),
        first_part,
        last_part,
        "document text truncated to fit inference budget"
    );

    (truncated, true)
}

/// Split a long document at section boundaries instead of mid-clause.
/// Short documents come back as a single chunk equal to the formatted
/// text; documents without detectable markers fall back to page-based
/// splitting. Each boundary-based chunk after the first is prefixed with
/// the last two paragraphs of its predecessor as carried-over context.
pub fn chunk_document(pages: &[Page], max_tokens: usize) -> Vec<String> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let full_text = format_pages_for_inference(pages);

    if full_text.len() <= max_chars {
        info!("document fits in a single chunk");
        return vec![full_text];
    }

    let boundaries = detect_section_boundaries(pages);
    if boundaries.is_empty() {
        warn!("no section boundaries detected, falling back to page-based splitting");
        return chunk_by_pages(pages, max_chars);
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut overlap: Vec<String> = Vec::new();

    let mut prev_offset = 0usize;
    for boundary in &boundaries {
        let section = slice_clamped(&full_text, prev_offset, boundary.char_offset);

        if !current.is_empty() && current.len() + section.len() > max_chars {
            let closed = with_overlap_prefix(&current, &overlap);
            overlap = trailing_paragraphs(&closed, 2);
            chunks.push(closed);
            current = section.to_string();
        } else {
            current.push_str(section);
        }

        prev_offset = boundary.char_offset;
    }

    let remaining = slice_clamped(&full_text, prev_offset, full_text.len());
    if !current.is_empty() || !remaining.is_empty() {
        let mut final_chunk = current;
        final_chunk.push_str(remaining);
        if !chunks.is_empty() {
            final_chunk = with_overlap_prefix(&final_chunk, &overlap);
        }
        chunks.push(final_chunk);
    }

    info!(chunks = chunks.len(), "split document at section boundaries");
    chunks
}

/// Fallback used when no section markers exist: accumulate whole pages up
/// to the budget, marking each continuation chunk with the page it resumes
/// after. No paragraph overlap in this mode.
fn chunk_by_pages(pages: &[Page], max_chars: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for page in pages {
        let page_block = format!("Page {}:\n{}\n\n", page.page_number, page.text);

        if !current.is_empty() && current.len() + page_block.len() > max_chars {
            chunks.push(current);
            current = format!(
                "[...continuing from page {}...]\n\n{page_block}",
                page.page_number.saturating_sub(1)
            );
        } else {
            current.push_str(&page_block);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    info!(chunks = chunks.len(), "split document at page boundaries");
    chunks
}

fn with_overlap_prefix(chunk: &str, overlap: &[String]) -> String {
    if overlap.is_empty() {
        return chunk.to_string();
    }
    format!("{OVERLAP_HEADER}{}\n\n{chunk}", overlap.join("\n\n"))
}

fn trailing_paragraphs(text: &str, count: usize) -> Vec<String> {
    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    paragraphs
        .iter()
        .skip(paragraphs.len().saturating_sub(count))
        .map(|paragraph| paragraph.to_string())
        .collect()
}

/// Boundary offsets are measured against raw concatenated page text, so
/// they can drift from (and overrun) the formatted document; clamp and
/// snap to char boundaries before slicing.
fn slice_clamped(text: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(text.len());
    let mut end = end.min(text.len());
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    if start > end {
        start = end;
    }
    &text[start..end]
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
    fn short_documents_come_back_as_one_chunk() {
        let pages = vec![page(1, "short text"), page(2, "more text")];
        let chunks = chunk_document(&pages, 40_000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "Page 1:\nshort text\n\nPage 2:\nmore text");
    }

    #[test]
    fn boundary_chunking_carries_overlap_context() {
        let filler = "clause text repeated for bulk ".repeat(10);
        let pages: Vec<Page> = (1..=4)
            .map(|section| page(section, &format!("SECTION {section}.\n{filler}")))
            .collect();

        // 150 tokens * 4 chars is well under one section per chunk.
        let chunks = chunk_document(&pages, 150);

        assert!(chunks.len() > 1);
        assert!(chunks[1].starts_with("\n\n[...context from previous section...]\n"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let filler = "repeatable clause body ".repeat(20);
        let pages: Vec<Page> = (1..=3)
            .map(|section| page(section, &format!("ARTICLE {section}\n{filler}")))
            .collect();

        assert_eq!(chunk_document(&pages, 120), chunk_document(&pages, 120));
    }

    #[test]
    fn page_fallback_marks_continuation_points() {
        let body = "plain prose with no headings at all ".repeat(10);
        let pages = vec![page(1, &body), page(2, &body), page(3, &body)];

        let chunks = chunk_document(&pages, 100);

        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with("Page 1:\n"));
        assert!(chunks[1].starts_with("[...continuing from page "));
        let joined = chunks.join("");
        for number in 1..=3 {
            let marker = format!("Page {number}:\n");
            assert_eq!(joined.matches(&marker).count(), 1);
        }
    }

    #[test]
    fn smart_truncate_keeps_head_and_tail() {
        let text = "A".repeat(600) + &"Z".repeat(600);
        let (truncated, was_truncated) = smart_truncate(&text, 1000);

        assert!(was_truncated);
        assert!(truncated.starts_with('A'));
        assert!(truncated.ends_with('Z'));
        assert!(truncated.contains("[... middle section omitted due to length ...]"));
        assert_eq!(truncated.chars().filter(|c| *c == 'A').count(), 600);
        assert_eq!(truncated.chars().filter(|c| *c == 'Z').count(), 400);
    }

    #[test]
    fn smart_truncate_passes_short_text_through() {
        let (text, was_truncated) = smart_truncate("already short", 1000);
        assert_eq!(text, "already short");
        assert!(!was_truncated);
    }

    #[test]
    fn preprocess_collapses_padded_line_breaks() {
        assert_eq!(
            preprocess_page_text("  first line   \n   second line\n\n  third  "),
            "first line\nsecond line\nthird"
        );
    }

    #[test]
    fn clamped_slicing_respects_char_boundaries() {
        let text = "naïve résumé";
        let slice = slice_clamped(text, 0, 3);
        assert!(text.starts_with(slice));
        assert!(slice_clamped(text, 500, 600).is_empty());
    }
}
