use tracing::info;

use super::parse::ParsedFields;

/// Combine per-chunk field maps: the first chunk with a usable answer wins
/// for each field; a field no chunk answered usably still keeps its first
/// mention, even a null one, so the report reflects that the model saw it.
pub fn merge_chunk_results(results: &[ParsedFields], target_fields: &[&str]) -> ParsedFields {
    let mut merged = ParsedFields::new();

    for field in target_fields {
        let usable = results
            .iter()
            .find_map(|chunk| chunk.get(*field).filter(|answer| answer.is_usable()));

        let chosen = usable.or_else(|| results.iter().find_map(|chunk| chunk.get(*field)));

        if let Some(answer) = chosen {
            merged.insert((*field).to_string(), answer.clone());
        }
    }

    merged
}

/// Fields the second pass should revisit: absent, null, literal
/// "Not Found", or implausibly short answers.
pub fn fields_needing_recheck<'a>(
    merged: &ParsedFields,
    target_fields: &[&'a str],
) -> Vec<&'a str> {
    target_fields
        .iter()
        .filter(|field| match merged.get(**field) {
            None => true,
            Some(answer) => match answer.value_str() {
                None => true,
                Some(text) => {
                    let trimmed = text.trim();
                    trimmed == "null" || trimmed == "Not Found" || trimmed.len() < 3
                }
            },
        })
        .copied()
        .collect()
}

/// Fold second-pass answers into the merged map, keeping only genuine
/// improvements. Returns how many fields were recovered.
pub fn apply_recheck(
    merged: &mut ParsedFields,
    recheck: ParsedFields,
    rechecked_fields: &[&str],
) -> usize {
    let mut fixes = 0usize;

    for field in rechecked_fields {
        if let Some(answer) = recheck.get(*field) {
            if answer.is_usable() {
                merged.insert((*field).to_string(), answer.clone());
                fixes += 1;
            }
        }
    }

    if fixes > 0 {
        info!(fixes, "second pass recovered missing fields");
    }

    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::extract::parse::parse_field_payload;

    fn chunk(raw: &str) -> ParsedFields {
        parse_field_payload(raw).into_fields_or_empty()
    }

    #[test]
    fn first_usable_answer_wins_in_chunk_order() {
        let chunks = vec![
            chunk(r#"{"effective_date": {"value": null}}"#),
            chunk(r#"{"effective_date": {"value": "January 1, 2024"}}"#),
            chunk(r#"{"effective_date": {"value": "February 2, 2025"}}"#),
        ];

        let merged = merge_chunk_results(&chunks, &["effective_date"]);
        assert_eq!(
            merged["effective_date"].value_str().as_deref(),
            Some("January 1, 2024")
        );
    }

    #[test]
    fn null_mentions_survive_when_nothing_usable_exists() {
        let chunks = vec![chunk(r#"{"expiration_date": {"value": null}}"#)];
        let merged = merge_chunk_results(&chunks, &["expiration_date"]);
        assert!(merged.contains_key("expiration_date"));
        assert!(!merged["expiration_date"].is_usable());
    }

    #[test]
    fn merge_is_deterministic_for_identical_input() {
        let chunks = vec![
            chunk(r#"{"parties": {"value": "Acme Corp and Beta LLC"}}"#),
            chunk(r#"{"parties": {"value": "Acme and Beta"}}"#),
        ];

        let first = merge_chunk_results(&chunks, &["parties"]);
        let second = merge_chunk_results(&chunks, &["parties"]);
        assert_eq!(
            first["parties"].value_str(),
            second["parties"].value_str()
        );
    }

    #[test]
    fn recheck_criteria_catch_missing_null_and_short_answers() {
        let merged = chunk(
            r#"{
                "effective_date": {"value": "January 1, 2024"},
                "expiration_date": {"value": null},
                "liability_cap": {"value": "Not Found"},
                "currency": {"value": "a"}
            }"#,
        );

        let gaps = fields_needing_recheck(
            &merged,
            &[
                "effective_date",
                "expiration_date",
                "liability_cap",
                "currency",
                "governing_law",
            ],
        );

        assert_eq!(
            gaps,
            vec!["expiration_date", "liability_cap", "currency", "governing_law"]
        );
    }

    #[test]
    fn recheck_applies_only_usable_improvements() {
        let mut merged = chunk(r#"{"expiration_date": {"value": null}, "currency": {"value": null}}"#);
        let recheck = chunk(
            r#"{"expiration_date": {"value": "December 31, 2026"}, "currency": {"value": null}}"#,
        );

        let fixes = apply_recheck(&mut merged, recheck, &["expiration_date", "currency"]);

        assert_eq!(fixes, 1);
        assert_eq!(
            merged["expiration_date"].value_str().as_deref(),
            Some("December 31, 2026")
        );
        assert!(!merged["currency"].is_usable());
    }
}
