use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;

use crate::catalog::{calculate_custom_credits, FieldCatalog, Tier, MAX_CUSTOM_FIELDS};
use crate::cli::{FieldsArgs, MenuArg};
use crate::util::print_json_pretty;

#[derive(Debug, Serialize)]
struct FieldListing {
    tier: String,
    credits: Option<u32>,
    field_count: usize,
    max_custom_fields: usize,
    categories: Vec<CategoryListing>,
}

#[derive(Debug, Serialize)]
struct CategoryListing {
    key: String,
    label: String,
    fields: Vec<FieldListingEntry>,
}

#[derive(Debug, Serialize)]
struct FieldListingEntry {
    name: String,
    description: String,
    field_type: String,
}

pub fn run(args: FieldsArgs) -> Result<()> {
    let catalog = FieldCatalog::builtin();

    if let Some(count) = args.quote {
        let credits = calculate_custom_credits(count)?;
        if args.json {
            print_json_pretty(&serde_json::json!({
                "field_count": count,
                "credits": credits,
            }))?;
        } else {
            println!("{count} fields -> {credits} credits");
        }
        return Ok(());
    }

    let tier = Tier::from_name(args.tier.as_str());
    let listing = build_listing(&catalog, tier);

    if args.json {
        print_json_pretty(&listing)?;
        return Ok(());
    }

    let credits_label = match listing.credits {
        Some(credits) => format!("{credits} credits"),
        None => "menu only".to_string(),
    };
    println!(
        "Tier {} ({} fields, {credits_label})",
        listing.tier, listing.field_count
    );
    for category in &listing.categories {
        println!("\n{}", category.label);
        for field in &category.fields {
            println!(
                "  {:<28} [{}] {}",
                field.name, field.field_type, field.description
            );
        }
    }

    Ok(())
}

fn build_listing(catalog: &FieldCatalog, tier: Tier) -> FieldListing {
    let member_fields: HashSet<&str> = catalog.tier_fields(tier).into_iter().collect();

    let categories = catalog
        .categories()
        .iter()
        .filter_map(|category| {
            let fields: Vec<FieldListingEntry> = category
                .fields
                .iter()
                .filter(|field| member_fields.contains(field.name))
                .map(|field| FieldListingEntry {
                    name: field.name.to_string(),
                    description: field.description.to_string(),
                    field_type: match catalog.field_type(field.name) {
                        crate::model::FieldType::Derived => "derived".to_string(),
                        crate::model::FieldType::Extractive => "extractive".to_string(),
                    },
                })
                .collect();

            if fields.is_empty() {
                None
            } else {
                Some(CategoryListing {
                    key: category.key.to_string(),
                    label: category.label.to_string(),
                    fields,
                })
            }
        })
        .collect();

    FieldListing {
        tier: tier.as_str().to_string(),
        credits: match tier {
            Tier::Full => None,
            other => Some(other.credits()),
        },
        field_count: member_fields.len(),
        max_custom_fields: MAX_CUSTOM_FIELDS,
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_filters_to_tier_membership() {
        let catalog = FieldCatalog::builtin();
        let listing = build_listing(&catalog, Tier::Essential);
        assert_eq!(listing.field_count, 9);
        assert_eq!(listing.categories.len(), 3);
        assert_eq!(listing.credits, Some(1));
    }

    #[test]
    fn full_menu_lists_every_category() {
        let catalog = FieldCatalog::builtin();
        let listing = build_listing(&catalog, Tier::Full);
        assert_eq!(listing.categories.len(), catalog.categories().len());
        assert_eq!(listing.field_count, catalog.field_count());
        assert_eq!(listing.credits, None);
    }
}
