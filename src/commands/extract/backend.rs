use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tracing::warn;

use crate::model::Rect;

/// Raw table cells as reported by the detection collaborator: one row of
/// headers followed by data rows.
pub type RawTable = Vec<Vec<String>>;

/// Page-level access to a loaded document. Per-page failures degrade to
/// empty results rather than aborting the run.
pub trait DocumentBackend {
    fn is_encrypted(&self) -> bool;

    fn page_count(&self) -> usize;

    /// Plain text of a 1-based page. Empty for out-of-range pages.
    fn page_text(&self, page_number: usize) -> &str;

    /// Pixel rectangles of `needle` on a 1-based page.
    fn search_page(&self, page_number: usize, needle: &str) -> Vec<Rect>;

    fn page_tables(&self, page_number: usize) -> Vec<RawTable>;
}

/// Poppler-backed document access: `pdfinfo` for metadata, `pdftotext` for
/// page text, `pdftotext -bbox` for word rectangles.
pub struct PopplerBackend {
    pdf_path: PathBuf,
    pages: Vec<String>,
    encrypted: bool,
}

impl PopplerBackend {
    pub fn open(pdf_path: &Path, max_pages: Option<usize>) -> Result<Self> {
        let info = run_pdfinfo(pdf_path)?;
        let encrypted = info.encrypted;

        let mut pages = if encrypted {
            Vec::new()
        } else {
            extract_pages_with_pdftotext(pdf_path, max_pages)?
        };

        // pdftotext drops trailing blank pages; keep the page count honest.
        let expected = match max_pages {
            Some(limit) => info.page_count.min(limit),
            None => info.page_count,
        };
        while pages.len() < expected {
            pages.push(String::new());
        }
        pages.truncate(expected);

        Ok(Self {
            pdf_path: pdf_path.to_path_buf(),
            pages,
            encrypted,
        })
    }
}

impl DocumentBackend for PopplerBackend {
    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_number: usize) -> &str {
        page_number
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn search_page(&self, page_number: usize, needle: &str) -> Vec<Rect> {
        if needle.trim().is_empty() || page_number < 1 || page_number > self.pages.len() {
            return Vec::new();
        }

        match page_word_boxes(&self.pdf_path, page_number) {
            Ok(words) => find_word_sequence(&words, needle),
            Err(error) => {
                warn!(
                    page = page_number,
                    error = %error,
                    "word-box extraction failed, treating page as unsearchable"
                );
                Vec::new()
            }
        }
    }

    fn page_tables(&self, page_number: usize) -> Vec<RawTable> {
        detect_text_tables(self.page_text(page_number))
    }
}

struct PdfInfo {
    page_count: usize,
    encrypted: bool,
}

fn run_pdfinfo(pdf_path: &Path) -> Result<PdfInfo> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .with_context(|| format!("failed to execute pdfinfo for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdfinfo returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut page_count = 0usize;
    let mut encrypted = false;

    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("Pages:") {
            page_count = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("Encrypted:") {
            encrypted = value.trim().starts_with("yes");
        }
    }

    Ok(PdfInfo {
        page_count,
        encrypted,
    })
}

fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    max_pages: Option<usize>,
) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(limit) = max_pages {
        command.arg("-l").arg(limit.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    Ok(pages)
}

struct WordBox {
    text: String,
    rect: Rect,
}

fn page_word_boxes(pdf_path: &Path, page_number: usize) -> Result<Vec<WordBox>> {
    let output = Command::new("pdftotext")
        .arg("-bbox")
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| {
            format!(
                "failed to execute pdftotext -bbox for {} page {}",
                pdf_path.display(),
                page_number
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext -bbox returned non-zero exit status for {} page {}: {}",
            pdf_path.display(),
            page_number,
            stderr.trim()
        );
    }

    let body = String::from_utf8_lossy(&output.stdout);
    let word_regex = Regex::new(
        r#"<word xMin="([0-9.]+)" yMin="([0-9.]+)" xMax="([0-9.]+)" yMax="([0-9.]+)">([^<]*)</word>"#,
    )
    .expect("valid word-box pattern");

    let mut words = Vec::new();
    for captures in word_regex.captures_iter(&body) {
        let coords: Option<Vec<f64>> = (1..=4)
            .map(|index| captures.get(index).and_then(|m| m.as_str().parse().ok()))
            .collect();
        let Some(coords) = coords else {
            continue;
        };
        let text = unescape_xml(captures.get(5).map(|m| m.as_str()).unwrap_or(""));
        words.push(WordBox {
            text,
            rect: [coords[0], coords[1], coords[2], coords[3]],
        });
    }

    Ok(words)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn comparable_token(token: &str) -> String {
    token
        .trim_matches(|character: char| !character.is_alphanumeric())
        .to_lowercase()
}

/// Locate `needle` as a run of consecutive page words and return the
/// rectangles of every word in every matching run.
fn find_word_sequence(words: &[WordBox], needle: &str) -> Vec<Rect> {
    let needle_tokens: Vec<String> = needle
        .split_whitespace()
        .map(comparable_token)
        .filter(|token| !token.is_empty())
        .collect();
    if needle_tokens.is_empty() || words.is_empty() {
        return Vec::new();
    }

    let page_tokens: Vec<String> = words
        .iter()
        .map(|word| comparable_token(&word.text))
        .collect();

    let mut rects = Vec::new();
    let span = needle_tokens.len();

    if span == 1 {
        for (index, token) in page_tokens.iter().enumerate() {
            if token.contains(needle_tokens[0].as_str()) {
                rects.push(words[index].rect);
            }
        }
        return rects;
    }

    for start in 0..page_tokens.len().saturating_sub(span - 1) {
        let window = &page_tokens[start..start + span];
        let interior_match = window[1..span - 1] == needle_tokens[1..span - 1];
        // Leading/trailing tokens may be clipped mid-word by the caller.
        let edges_match = window[0].ends_with(needle_tokens[0].as_str())
            && window[span - 1].starts_with(needle_tokens[span - 1].as_str());
        if interior_match && edges_match {
            for word in &words[start..start + span] {
                rects.push(word.rect);
            }
        }
    }

    rects
}

/// Recover tabular regions from whitespace-aligned or pipe-delimited text.
/// A table is two or more consecutive lines splitting into the same number
/// of cells (at least two).
fn detect_text_tables(page_text: &str) -> Vec<RawTable> {
    let mut tables = Vec::new();
    let mut current: RawTable = Vec::new();

    for line in page_text.lines() {
        let cells = split_table_cells(line);
        let continues = cells.len() >= 2
            && current
                .last()
                .map(|previous: &Vec<String>| previous.len() == cells.len())
                .unwrap_or(true);

        if continues {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                tables.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            if cells.len() >= 2 {
                current.push(cells);
            }
        }
    }

    if current.len() >= 2 {
        tables.push(current);
    }

    tables
}

fn split_table_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let cells: Vec<String> = if trimmed.contains('|') {
        trimmed
            .split('|')
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect()
    } else {
        let splitter = Regex::new(r"\s{2,}|\t+").expect("valid cell-split pattern");
        splitter
            .split(trimmed)
            .map(|cell| cell.trim().to_string())
            .filter(|cell| !cell.is_empty())
            .collect()
    };

    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: f64) -> WordBox {
        WordBox {
            text: text.to_string(),
            rect: [x, 10.0, x + 20.0, 20.0],
        }
    }

    #[test]
    fn word_sequence_matches_across_words() {
        let words = vec![
            word("effective", 0.0),
            word("as", 25.0),
            word("of", 50.0),
            word("January", 75.0),
            word("1,", 100.0),
            word("2024.", 125.0),
        ];

        let rects = find_word_sequence(&words, "January 1, 2024");
        assert_eq!(rects.len(), 3);
        assert_eq!(rects[0][0], 75.0);
    }

    #[test]
    fn word_sequence_is_punctuation_tolerant() {
        let words = vec![word("Net", 0.0), word("30", 25.0), word("days;", 50.0)];
        assert_eq!(find_word_sequence(&words, "net 30 days").len(), 3);
    }

    #[test]
    fn word_sequence_misses_absent_text() {
        let words = vec![word("some", 0.0), word("text", 25.0)];
        assert!(find_word_sequence(&words, "missing phrase here").is_empty());
    }

    #[test]
    fn single_word_needle_matches_by_containment() {
        let words = vec![word("prepayment,", 0.0)];
        assert_eq!(find_word_sequence(&words, "payment").len(), 1);
    }

    #[test]
    fn text_tables_require_consistent_columns() {
        let page = "Intro line\nMilestone  Amount  Date\nKickoff  $10,000  2024-01-01\nDelivery  $20,000  2024-03-01\nClosing paragraph";
        let tables = detect_text_tables(page);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][0], vec!["Milestone", "Amount", "Date"]);
    }

    #[test]
    fn pipe_delimited_rows_are_split_on_pipes() {
        assert_eq!(
            split_table_cells("Kickoff | $10,000 | 2024-01-01"),
            vec!["Kickoff", "$10,000", "2024-01-01"]
        );
    }

    #[test]
    fn short_runs_are_not_tables() {
        let page = "Heading  Value\nplain prose follows here";
        assert!(detect_text_tables(page).is_empty());
    }
}
