use tracing::{info, warn};

use crate::catalog::{FieldCatalog, FieldSelection};
use crate::error::InputError;
use crate::model::{ExtractionResult, Page, PaymentScheduleEntry, Table};

use super::backend::DocumentBackend;
use super::chunking::{
    chunk_document, format_pages_for_inference, preprocess_page_text, smart_truncate,
};
use super::grounding::ground_field;
use super::inference::{log_usage, InferenceClient, RetryPolicy};
use super::merge::{apply_recheck, fields_needing_recheck, merge_chunk_results};
use super::parse::{parse_field_payload, ParsedFields};
use super::prompt::{build_recheck_prompt, build_schema_prompt};
use super::tables::{extract_tables, format_tables_for_llm, normalize_payment_schedule};

const FIRST_PASS_MAX_TOKENS: u32 = 4500;
const RECHECK_MAX_TOKENS: u32 = 2000;
const CHUNK_PASS_BUDGET: usize = 100_000;
const RECHECK_BUDGET: usize = 80_000;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub max_chunk_tokens: usize,
    pub chunk_page_threshold: usize,
    pub skip_recheck: bool,
}

/// Everything the extraction passes need, behind seams so the pipeline
/// runs identically against poppler + the live API or test doubles.
pub struct PipelineEnv<'a> {
    pub backend: &'a dyn DocumentBackend,
    pub client: &'a dyn InferenceClient,
    pub catalog: &'a FieldCatalog,
    pub retry: RetryPolicy,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub analysis: std::collections::BTreeMap<String, ExtractionResult>,
    pub grounded_count: usize,
    pub ungrounded_extractive: usize,
    pub pages_analysed: usize,
    pub chunks_processed: usize,
    pub tables: Vec<Table>,
    pub payment_schedule: Vec<PaymentScheduleEntry>,
    pub contract_length: usize,
    pub warnings: Vec<String>,
}

/// Run the full extraction: page preprocessing, table mining, first-pass
/// inference (chunked for long documents), gap-filling recheck, then a
/// grounding pass over every requested field. Model-side failures degrade
/// into "Not Found" records; only unusable input is a hard error.
pub fn run_pipeline(
    env: &PipelineEnv,
    selection: &FieldSelection,
    options: ExtractOptions,
) -> Result<RunOutcome, InputError> {
    if env.backend.is_encrypted() {
        return Err(InputError::EncryptedDocument);
    }

    let page_count = env.backend.page_count();
    let raw_pages: Vec<Page> = (1..=page_count)
        .map(|page_number| Page {
            page_number,
            text: env.backend.page_text(page_number).to_string(),
        })
        .collect();

    if raw_pages.iter().all(|page| page.text.trim().is_empty()) {
        return Err(InputError::NoExtractableText);
    }

    let pages: Vec<Page> = raw_pages
        .iter()
        .map(|page| Page {
            page_number: page.page_number,
            text: preprocess_page_text(&page.text),
        })
        .collect();
    let contract_length: usize = pages.iter().map(|page| page.text.len()).sum();

    let mut warnings = Vec::new();

    let tables = extract_tables(env.backend);
    let table_context = format_tables_for_llm(&tables);
    let payment_schedule = normalize_payment_schedule(&tables);
    if !tables.is_empty() {
        info!(
            tables = tables.len(),
            payment_entries = payment_schedule.len(),
            "table extraction complete"
        );
    }

    let target_fields: Vec<&str> = selection.fields.to_vec();
    let tier_label = selection.label.as_str();

    let chunks = if page_count > options.chunk_page_threshold {
        info!(pages = page_count, "long document, chunking before extraction");
        chunk_document(&pages, options.max_chunk_tokens)
    } else {
        Vec::new()
    };

    info!(fields = target_fields.len(), tier = tier_label, "pass 1: initial extraction");
    let (mut merged, chunks_processed) = if chunks.len() > 1 {
        first_pass_chunked(env, &chunks, &target_fields, tier_label, &table_context, &mut warnings)
    } else {
        let fields = first_pass_single(env, &pages, &target_fields, tier_label, &table_context, &mut warnings);
        (fields, 1)
    };

    if options.skip_recheck {
        info!("pass 2 disabled, keeping initial results");
    } else {
        recheck_pass(env, &pages, &target_fields, &mut merged, &mut warnings);
    }

    info!("pass 3: grounding check and coordinate mapping");
    let full_text: String = pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<&str>>()
        .join(" ");

    let mut analysis = std::collections::BTreeMap::new();
    let mut grounded_count = 0usize;
    let mut ungrounded_extractive = 0usize;

    for field in &target_fields {
        let field_type = env.catalog.field_type(field);
        let (result, grounded, extractive_miss) = ground_field(
            env.backend,
            &full_text,
            field,
            merged.get(*field),
            field_type,
        );
        if grounded {
            grounded_count += 1;
        }
        if extractive_miss {
            ungrounded_extractive += 1;
        }
        analysis.insert((*field).to_string(), result);
    }

    Ok(RunOutcome {
        analysis,
        grounded_count,
        ungrounded_extractive,
        pages_analysed: page_count,
        chunks_processed,
        tables,
        payment_schedule,
        contract_length,
        warnings,
    })
}

/// Single-shot extraction over the whole document, budgeted by how many
/// fields were requested.
fn first_pass_single(
    env: &PipelineEnv,
    pages: &[Page],
    target_fields: &[&str],
    tier_label: &str,
    table_context: &str,
    warnings: &mut Vec<String>,
) -> ParsedFields {
    let full_text = format_pages_for_inference(pages);
    info!(
        pages = pages.len(),
        chars = full_text.len(),
        "formatted document for inference"
    );

    let max_chars = match target_fields.len() {
        0..=9 => 100_000,
        10..=18 => 125_000,
        _ => 150_000,
    };

    let (mut text, _) = smart_truncate(&full_text, max_chars);
    if !table_context.is_empty() {
        text.push_str(table_context);
        info!(chars = table_context.len(), "added table context to inference input");
    }

    let system_prompt = build_schema_prompt(env.catalog, target_fields, tier_label);
    let user_message = format!("Analyze this contract text:\n\n{text}");

    match env
        .retry
        .run(|| env.client.complete(&system_prompt, &user_message, FIRST_PASS_MAX_TOKENS))
    {
        Ok(response) => {
            log_usage("pass1", &response);
            parse_field_payload(&response.text).into_fields_or_empty()
        }
        Err(error) => {
            warn!(error = %error, "first pass failed, continuing with no initial values");
            warnings.push(format!("first-pass extraction failed: {error}"));
            ParsedFields::new()
        }
    }
}

/// Chunked extraction: each chunk is queried independently and the answers
/// merged in chunk order. Table context rides on the first chunk only.
fn first_pass_chunked(
    env: &PipelineEnv,
    chunks: &[String],
    target_fields: &[&str],
    tier_label: &str,
    table_context: &str,
    warnings: &mut Vec<String>,
) -> (ParsedFields, usize) {
    info!(chunks = chunks.len(), "multi-chunk extraction");
    let system_prompt = build_schema_prompt(env.catalog, target_fields, tier_label);

    let mut results: Vec<ParsedFields> = Vec::new();

    for (index, chunk) in chunks.iter().enumerate() {
        let text = if index == 0 && !table_context.is_empty() {
            format!("{chunk}{table_context}")
        } else {
            chunk.clone()
        };

        info!(
            chunk = index + 1,
            total = chunks.len(),
            chars = text.len(),
            "processing chunk"
        );

        let (truncated, _) = smart_truncate(&text, CHUNK_PASS_BUDGET);
        let user_message = format!("Analyze this contract text:\n\n{truncated}");

        match env
            .retry
            .run(|| env.client.complete(&system_prompt, &user_message, FIRST_PASS_MAX_TOKENS))
        {
            Ok(response) => {
                log_usage("pass1_chunk", &response);
                results.push(parse_field_payload(&response.text).into_fields_or_empty());
            }
            Err(error) => {
                warn!(chunk = index + 1, error = %error, "chunk extraction failed, skipping chunk");
                warnings.push(format!("chunk {} extraction failed: {error}", index + 1));
            }
        }
    }

    (merge_chunk_results(&results, target_fields), chunks.len())
}

/// Second pass: revisit fields that came back missing, null, or
/// implausibly short, against a tighter slice of the document. Failures
/// keep the first-pass answers.
fn recheck_pass(
    env: &PipelineEnv,
    pages: &[Page],
    target_fields: &[&str],
    merged: &mut ParsedFields,
    warnings: &mut Vec<String>,
) {
    let gaps = fields_needing_recheck(merged, target_fields);
    if gaps.is_empty() {
        info!("pass 2: all fields extracted, skipping re-check");
        return;
    }

    info!(fields = gaps.len(), "pass 2: re-checking weak fields");

    let system_prompt = build_recheck_prompt(env.catalog, &gaps);
    let full_text = format_pages_for_inference(pages);
    let (truncated, _) = smart_truncate(&full_text, RECHECK_BUDGET);
    let user_message = format!("Re-analyze this contract:\n\n{truncated}");

    match env
        .retry
        .run(|| env.client.complete(&system_prompt, &user_message, RECHECK_MAX_TOKENS))
    {
        Ok(response) => {
            log_usage("pass2", &response);
            let recheck = parse_field_payload(&response.text).into_fields_or_empty();
            let fixes = apply_recheck(merged, recheck, &gaps);
            info!(fixes, gaps = gaps.len(), "pass 2 complete");
        }
        Err(error) => {
            warn!(error = %error, "pass 2 failed, keeping initial results");
            warnings.push(format!("re-check pass failed: {error}"));
        }
    }
}
