use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::{resolve_selection, FieldCatalog, Tier};
use crate::cli::ExtractArgs;
use crate::model::ExtractionReport;
use crate::util::{now_utc_string, print_json_pretty, sha256_file, write_json_pretty};

use super::backend::PopplerBackend;
use super::inference::{AnthropicClient, InferenceClient, RetryPolicy};
use super::pipeline::{run_pipeline, ExtractOptions, PipelineEnv};

pub fn run(args: ExtractArgs) -> Result<()> {
    let catalog = FieldCatalog::builtin();
    let tier = Tier::from_name(args.tier.as_str());
    let selection = resolve_selection(&catalog, tier, &args.fields)?;

    info!(
        tier = selection.label.as_str(),
        fields = selection.fields.len(),
        credits = selection.credits,
        "resolved field selection"
    );

    let backend = PopplerBackend::open(&args.pdf_path, args.max_pages)
        .with_context(|| format!("failed to open {}", args.pdf_path.display()))?;

    let client = AnthropicClient::from_env(
        &args.model,
        &args.api_base,
        Duration::from_millis(args.timeout_ms),
    )?;

    let env = PipelineEnv {
        backend: &backend,
        client: &client,
        catalog: &catalog,
        retry: RetryPolicy::default(),
    };
    let options = ExtractOptions {
        max_chunk_tokens: args.max_chunk_tokens,
        chunk_page_threshold: args.chunk_page_threshold,
        skip_recheck: args.skip_recheck,
    };

    let started = Instant::now();
    let outcome = run_pipeline(&env, &selection, options)?;
    let duration_ms = started.elapsed().as_millis();

    // One analysis entry per requested field, found or not.
    let fields_extracted = outcome.analysis.len();
    let grounding_rate = if fields_extracted > 0 {
        (outcome.grounded_count as f64 / fields_extracted as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    let mut warnings = selection.warnings.clone();
    warnings.extend(outcome.warnings);

    let report = ExtractionReport {
        extraction_timestamp: now_utc_string(),
        extraction_tier: selection.label.clone(),
        credits_used: selection.credits,
        fields_extracted,
        fields_grounded: outcome.grounded_count,
        grounding_rate,
        ungrounded_extractive: outcome.ungrounded_extractive,
        contract_length: outcome.contract_length,
        pages_analysed: outcome.pages_analysed,
        chunks_processed: outcome.chunks_processed,
        tables_extracted: outcome.tables.len(),
        payment_schedule: outcome.payment_schedule,
        analysis: outcome.analysis,
        duration_ms,
        source_sha256: sha256_file(&args.pdf_path).ok(),
        model_id: client.model_id().to_string(),
        warnings,
    };

    info!(
        fields_extracted,
        fields_grounded = report.fields_grounded,
        grounding_rate = report.grounding_rate,
        duration_ms = duration_ms as u64,
        "extraction complete"
    );

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &report)?;
            info!(path = %path.display(), "wrote extraction report");
        }
        None => print_json_pretty(&report)?,
    }

    Ok(())
}
