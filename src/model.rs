use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One page of extracted document text, 1-based and contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: usize,
    pub text: String,
}

/// A detected structural heading, positioned by absolute character offset
/// in the concatenated page text (pages joined with a 2-char separator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionBoundary {
    pub page: usize,
    pub title: String,
    pub char_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    PaymentSchedule,
    FeeTable,
    PartyTable,
    Generic,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PaymentSchedule => "payment_schedule",
            Self::FeeTable => "fee_table",
            Self::PartyTable => "party_table",
            Self::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub page: usize,
    pub table_index: usize,
    #[serde(rename = "type")]
    pub kind: TableKind,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentScheduleEntry {
    pub milestone: String,
    pub amount: String,
    pub date: String,
    pub page: usize,
}

/// Where a reported value came from. Fallback marks fields the model never
/// answered usably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractionSource {
    #[serde(rename = "System Fallback")]
    SystemFallback,
    #[serde(rename = "Inference (Claude)")]
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Extractive,
    Derived,
}

/// Pixel rectangle on a page: [x0, y0, x1, y1].
pub type Rect = [f64; 4];

/// Final per-field record. `grounded` means text evidence was found in the
/// document, not that the value is correct.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub value: String,
    pub source: ExtractionSource,
    pub page_number: Option<usize>,
    pub reference_snippet: Option<String>,
    pub bbox: Option<Vec<Rect>>,
    pub grounded: bool,
    pub field_type: FieldType,
}

impl ExtractionResult {
    pub fn not_found(field_type: FieldType) -> Self {
        Self {
            value: "Not Found".to_string(),
            source: ExtractionSource::SystemFallback,
            page_number: None,
            reference_snippet: None,
            bbox: None,
            grounded: false,
            field_type,
        }
    }
}

/// Structured run output, written as a pretty-JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub extraction_timestamp: String,
    pub extraction_tier: String,
    pub credits_used: u32,
    pub fields_extracted: usize,
    pub fields_grounded: usize,
    pub grounding_rate: f64,
    pub ungrounded_extractive: usize,
    pub contract_length: usize,
    pub pages_analysed: usize,
    pub chunks_processed: usize,
    pub tables_extracted: usize,
    pub payment_schedule: Vec<PaymentScheduleEntry>,
    pub analysis: BTreeMap<String, ExtractionResult>,
    pub duration_ms: u128,
    pub source_sha256: Option<String>,
    pub model_id: String,
    pub warnings: Vec<String>,
}
