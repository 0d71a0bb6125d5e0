use tracing::{info, warn};

use crate::model::{ExtractionResult, ExtractionSource, FieldType, Rect};
use crate::textmatch::{fuzzy_text_exists, FUZZY_MATCH_THRESHOLD};

use super::backend::DocumentBackend;
use super::parse::FieldAnswer;

/// Evidence produced by one verification strategy.
struct Evidence {
    snippet: Option<String>,
    bboxes: Vec<Rect>,
    method: &'static str,
}

/// Locate `text` on a page as pixel rectangles. Long strings rarely match
/// whole, so after a miss the first thirty characters are tried, then a
/// thirty-character window from the middle.
pub fn find_visual_coordinates(
    backend: &dyn DocumentBackend,
    page_number: usize,
    text: &str,
) -> Vec<Rect> {
    if text.trim().is_empty() || page_number < 1 || page_number > backend.page_count() {
        return Vec::new();
    }

    let clean: String = text.split_whitespace().collect::<Vec<&str>>().join(" ");

    let rects = backend.search_page(page_number, &clean);
    if !rects.is_empty() {
        return rects;
    }

    let chars: Vec<char> = clean.chars().collect();
    if chars.len() <= 30 {
        return Vec::new();
    }

    let head: String = chars[..30].iter().collect();
    let rects = backend.search_page(page_number, &head);
    if !rects.is_empty() {
        return rects;
    }

    let middle = chars.len() / 2;
    let end = (middle + 30).min(chars.len());
    let window: String = chars[middle..end].iter().collect();
    backend.search_page(page_number, &window)
}

/// Verify one extracted answer against the document, walking strategies in
/// priority order: citation rectangles on the stated page, then the value
/// itself on that page, then a fuzzy search of the citation across the
/// full text, and for derived fields a relaxed fuzzy check of the value's
/// opening characters.
///
/// Returns the finished record plus whether it grounded and whether an
/// extractive field failed to ground.
pub fn ground_field(
    backend: &dyn DocumentBackend,
    full_text: &str,
    field_name: &str,
    answer: Option<&FieldAnswer>,
    field_type: FieldType,
) -> (ExtractionResult, bool, bool) {
    let Some(answer) = answer.filter(|answer| answer.is_usable()) else {
        // An unanswered extractive field counts against grounding quality
        // just like an answered-but-unverifiable one.
        let extractive_miss = field_type == FieldType::Extractive;
        return (ExtractionResult::not_found(field_type), false, extractive_miss);
    };

    let value = answer.value_str().unwrap_or_default();
    let citation = answer.verbatim_source.as_deref().filter(|quote| !quote.trim().is_empty());
    let page = answer.page();

    let evidence = locate_evidence(backend, full_text, &value, citation, page, field_type);

    match evidence {
        Some(found) => {
            info!(
                field = field_name,
                method = found.method,
                page = page.unwrap_or(0),
                "grounded field"
            );
            let result = ExtractionResult {
                value,
                source: ExtractionSource::Inference,
                page_number: page,
                reference_snippet: found.snippet,
                bbox: if found.bboxes.is_empty() {
                    None
                } else {
                    Some(found.bboxes)
                },
                grounded: true,
                field_type,
            };
            (result, true, false)
        }
        None => {
            warn!(field = field_name, "could not ground extracted value");
            let extractive_miss = field_type == FieldType::Extractive;
            let result = ExtractionResult {
                value,
                source: ExtractionSource::Inference,
                page_number: page,
                reference_snippet: citation.map(str::to_string),
                bbox: None,
                grounded: false,
                field_type,
            };
            (result, false, extractive_miss)
        }
    }
}

fn locate_evidence(
    backend: &dyn DocumentBackend,
    full_text: &str,
    value: &str,
    citation: Option<&str>,
    page: Option<usize>,
    field_type: FieldType,
) -> Option<Evidence> {
    if let (Some(quote), Some(page)) = (citation, page) {
        let rects = find_visual_coordinates(backend, page, quote);
        if !rects.is_empty() {
            return Some(Evidence {
                snippet: Some(quote.to_string()),
                bboxes: rects,
                method: "citation_rects",
            });
        }
    }

    if let Some(page) = page {
        let rects = find_visual_coordinates(backend, page, value);
        if !rects.is_empty() {
            return Some(Evidence {
                snippet: Some(value.to_string()),
                bboxes: rects,
                method: "value_rects",
            });
        }
    }

    if let Some(quote) = citation {
        if fuzzy_text_exists(quote, full_text, FUZZY_MATCH_THRESHOLD) {
            return Some(Evidence {
                snippet: Some(quote.to_string()),
                bboxes: Vec::new(),
                method: "fuzzy_citation",
            });
        }
    }

    if field_type == FieldType::Derived {
        let prefix: String = value.chars().take(100).collect();
        if fuzzy_text_exists(&prefix, full_text, FUZZY_MATCH_THRESHOLD) {
            return Some(Evidence {
                snippet: None,
                bboxes: Vec::new(),
                method: "derived_prefix",
            });
        }
    }

    None
}
