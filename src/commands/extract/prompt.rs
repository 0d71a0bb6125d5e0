use std::collections::HashSet;

use crate::catalog::FieldCatalog;

const DEFAULT_EXTRACTION_PROMPT: &str = "You are an expert contract analyst. Extract the requested fields into JSON format.

EXTRACTION TIER: {tier_label}

FIELDS TO EXTRACT:
{fields_list}

Instructions:
1. Extract the 'value' and 'verbatim_source' (exact substring) for each field.
2. If not found, return null.
3. Return ONLY JSON.
";

const DEFAULT_RECHECK_PROMPT: &str = "You are an expert contract analyst doing a SECOND PASS review.
The initial extraction MISSED these fields. Look for synonyms or hidden clauses.

Return JSON format with 'value', 'verbatim_source', and 'page_number'.
";

/// Render the numbered, category-banner field list for the target fields,
/// walking the catalog in its declared order so prompts are deterministic.
fn render_fields_list(catalog: &FieldCatalog, target_fields: &[&str]) -> String {
    let targets: HashSet<&str> = target_fields.iter().copied().collect();

    let mut sections = Vec::new();
    let mut field_count = 0usize;

    for category in catalog.categories() {
        let active: Vec<_> = category
            .fields
            .iter()
            .filter(|field| targets.contains(field.name))
            .collect();
        if active.is_empty() {
            continue;
        }

        let mut section = format!("\n═══ {} ═══", category.label);
        for field in active {
            field_count += 1;
            section.push_str(&format!(
                "\n{field_count}. {}\n   - {}",
                field.name, field.description
            ));
        }
        sections.push(section);
    }

    sections.join("\n")
}

/// First-pass system prompt. The template comes from `EXTRACTION_PROMPT`
/// when set; templates carrying a `{fields_list}` placeholder get both
/// placeholders substituted, anything else gets the field list appended.
pub fn build_schema_prompt(
    catalog: &FieldCatalog,
    target_fields: &[&str],
    tier_label: &str,
) -> String {
    let fields_list = render_fields_list(catalog, target_fields);
    let template =
        std::env::var("EXTRACTION_PROMPT").unwrap_or_else(|_| DEFAULT_EXTRACTION_PROMPT.to_string());

    if template.contains("{fields_list}") {
        template
            .replace("{tier_label}", &tier_label.to_uppercase())
            .replace("{fields_list}", &fields_list)
    } else {
        format!("{template}\n\nFIELDS TO EXTRACT:\n{fields_list}")
    }
}

/// Second-pass system prompt: the recheck template plus one description
/// line per field still missing. Overridable via `RECHECK_PROMPT`.
pub fn build_recheck_prompt(catalog: &FieldCatalog, fields: &[&str]) -> String {
    let template =
        std::env::var("RECHECK_PROMPT").unwrap_or_else(|_| DEFAULT_RECHECK_PROMPT.to_string());

    let descriptions: Vec<String> = fields
        .iter()
        .map(|field| {
            let description = catalog.description(field);
            if description.is_empty() {
                format!("- {field}: {field}")
            } else {
                format!("- {field}: {description}")
            }
        })
        .collect();

    format!(
        "{template}\n\nFIELDS TO RE-EXTRACT:\n{}",
        descriptions.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_prompt_numbers_fields_across_categories() {
        let catalog = FieldCatalog::builtin();
        let prompt = build_schema_prompt(
            &catalog,
            &["effective_date", "parties", "total_contract_value"],
            "essential",
        );

        assert!(prompt.contains("EXTRACTION TIER: ESSENTIAL"));
        assert!(prompt.contains("1. effective_date"));
        assert!(prompt.contains("2. parties"));
        assert!(prompt.contains("3. total_contract_value"));
        assert!(prompt.contains("═══ CORE DATES & PARTIES ═══"));
        assert!(prompt.contains("═══ FINANCIAL TERMS ═══"));
    }

    #[test]
    fn schema_prompt_skips_inactive_categories() {
        let catalog = FieldCatalog::builtin();
        let prompt = build_schema_prompt(&catalog, &["effective_date"], "custom");
        assert!(!prompt.contains("FINANCIAL TERMS"));
    }

    #[test]
    fn field_order_follows_catalog_not_request() {
        let catalog = FieldCatalog::builtin();
        let reversed = build_schema_prompt(&catalog, &["parties", "effective_date"], "custom");
        let forward = build_schema_prompt(&catalog, &["effective_date", "parties"], "custom");
        assert_eq!(reversed, forward);
    }

    #[test]
    fn recheck_prompt_lists_field_descriptions() {
        let catalog = FieldCatalog::builtin();
        let prompt = build_recheck_prompt(&catalog, &["liability_cap"]);
        assert!(prompt.contains("SECOND PASS"));
        assert!(prompt.contains("- liability_cap:"));
    }
}
