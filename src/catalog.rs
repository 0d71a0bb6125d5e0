use std::collections::HashSet;

use tracing::warn;

use crate::error::ConfigError;
use crate::model::FieldType;

/// Maximum fields allowed per extraction run.
pub const MAX_CUSTOM_FIELDS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCategory {
    pub key: &'static str,
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Essential,
    Professional,
    Enterprise,
    Full,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Essential => "essential",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Full => "full",
        }
    }

    /// Unknown tier names fall back to essential rather than failing the run.
    pub fn from_name(name: &str) -> Self {
        match name {
            "essential" => Self::Essential,
            "professional" => Self::Professional,
            "enterprise" => Self::Enterprise,
            "full" => Self::Full,
            other => {
                warn!(tier = other, "unknown tier, defaulting to essential");
                Self::Essential
            }
        }
    }

    pub fn credits(self) -> u32 {
        match self {
            Self::Essential => 1,
            Self::Professional => 3,
            Self::Enterprise => 5,
            // The full bank is a selection menu, not an extraction tier.
            Self::Full => 0,
        }
    }
}

/// Credit cost for a custom field selection. Enforces the 25-field cap.
pub fn calculate_custom_credits(field_count: usize) -> Result<u32, ConfigError> {
    if field_count > MAX_CUSTOM_FIELDS {
        return Err(ConfigError::TooManyFields {
            requested: field_count,
            max: MAX_CUSTOM_FIELDS,
        });
    }
    Ok(if field_count <= 9 {
        1
    } else if field_count <= 18 {
        3
    } else {
        5
    })
}

const DATES_PARTIES: &[FieldSpec] = &[
    FieldSpec {
        name: "effective_date",
        description: "Contract START date / Effective date",
    },
    FieldSpec {
        name: "expiration_date",
        description: "Contract END date / Expiration date",
    },
    FieldSpec {
        name: "parties",
        description: "Names of all parties/entities in the contract",
    },
];

const FINANCIAL_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "total_contract_value",
        description: "Total monetary value of the contract (calculate if needed)",
    },
    FieldSpec {
        name: "payment_terms",
        description: "Payment schedule and terms (e.g., Net 30, monthly)",
    },
    FieldSpec {
        name: "currency",
        description: "Currency used (USD, EUR, GBP, etc.)",
    },
];

const TERMINATION_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "termination_notice_period",
        description: "Notice period required to terminate",
    },
    FieldSpec {
        name: "renewal_terms",
        description: "Auto-renewal conditions, renewal options",
    },
    FieldSpec {
        name: "governing_law",
        description: "Jurisdiction / Governing law / Choice of law",
    },
];

const LIABILITY_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "liability_cap",
        description: "Maximum liability amount or percentage cap",
    },
    FieldSpec {
        name: "indemnification_clauses",
        description: "Who indemnifies whom and for what",
    },
    FieldSpec {
        name: "insurance_requirements",
        description: "Required insurance types and minimum amounts",
    },
    FieldSpec {
        name: "limitation_of_liability",
        description: "Exclusions, carve-outs from liability limits",
    },
];

const PERFORMANCE_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "deliverables",
        description: "Key deliverables, milestones, or work products",
    },
    FieldSpec {
        name: "sla_terms",
        description: "Service Level Agreement terms and commitments",
    },
    FieldSpec {
        name: "performance_metrics",
        description: "KPIs, penalties for non-performance",
    },
    FieldSpec {
        name: "acceptance_criteria",
        description: "How deliverables/work is accepted",
    },
];

const IP_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "ip_ownership",
        description: "Who owns intellectual property created",
    },
    FieldSpec {
        name: "license_scope",
        description: "License type (exclusive, non-exclusive, perpetual)",
    },
    FieldSpec {
        name: "usage_restrictions",
        description: "Geographic, industry, or use-case limitations",
    },
];

const COMPLIANCE_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "confidentiality_period",
        description: "Duration of confidentiality/NDA obligations",
    },
    FieldSpec {
        name: "non_compete_terms",
        description: "Non-compete restrictions and duration",
    },
    FieldSpec {
        name: "arbitration_clause",
        description: "Dispute resolution method (arbitration, mediation, litigation)",
    },
    FieldSpec {
        name: "audit_rights",
        description: "Right to audit records, financials, or compliance",
    },
    FieldSpec {
        name: "data_protection",
        description: "GDPR, CCPA, or other data privacy obligations",
    },
];

const ADMINISTRATIVE_BASIC: &[FieldSpec] = &[
    FieldSpec {
        name: "notice_address",
        description: "Address for official notices/communications",
    },
    FieldSpec {
        name: "amendment_process",
        description: "How the contract can be modified",
    },
    FieldSpec {
        name: "assignment_rights",
        description: "Whether contract can be assigned/transferred",
    },
    FieldSpec {
        name: "force_majeure",
        description: "Force majeure clause presence and terms",
    },
];

const PAYMENT_WORKFLOW: &[FieldSpec] = &[
    FieldSpec {
        name: "late_fees",
        description: "Late payment penalties, interest rates, or fee structures",
    },
    FieldSpec {
        name: "payment_milestones",
        description: "Milestone-based payment schedule and triggers",
    },
    FieldSpec {
        name: "invoice_frequency",
        description: "How often invoices are submitted (monthly, quarterly, etc.)",
    },
    FieldSpec {
        name: "dispute_procedures",
        description: "Process for disputing invoices or payments",
    },
    FieldSpec {
        name: "escrow_terms",
        description: "Escrow arrangements, holdbacks, or retainage terms",
    },
];

const COMPLIANCE_EXTENDED: &[FieldSpec] = &[
    FieldSpec {
        name: "gdpr_obligations",
        description: "Specific GDPR compliance requirements and data handling",
    },
    FieldSpec {
        name: "ccpa_compliance",
        description: "California Consumer Privacy Act requirements",
    },
    FieldSpec {
        name: "security_standards",
        description: "Required security certifications (SOC2, ISO27001, etc.)",
    },
    FieldSpec {
        name: "audit_frequency",
        description: "How often audits can be conducted",
    },
    FieldSpec {
        name: "certification_requirements",
        description: "Required certifications or qualifications",
    },
];

const PERFORMANCE_EXTENDED: &[FieldSpec] = &[
    FieldSpec {
        name: "penalties",
        description: "Financial penalties for non-performance or SLA breaches",
    },
    FieldSpec {
        name: "cure_periods",
        description: "Time allowed to remedy breaches before termination",
    },
    FieldSpec {
        name: "escalation_procedures",
        description: "How disputes or issues are escalated",
    },
    FieldSpec {
        name: "change_order_process",
        description: "Procedure for scope changes and modifications",
    },
    FieldSpec {
        name: "warranty_terms",
        description: "Warranty period, coverage, and limitations",
    },
];

const RISK_MANAGEMENT: &[FieldSpec] = &[
    FieldSpec {
        name: "risk_allocation",
        description: "How risks are divided between parties",
    },
    FieldSpec {
        name: "contingency_provisions",
        description: "Backup plans or contingency clauses",
    },
    FieldSpec {
        name: "material_breach_definition",
        description: "What constitutes a material breach",
    },
    FieldSpec {
        name: "remedies",
        description: "Available remedies for breach (damages, specific performance)",
    },
];

const TERMINATION_EXTENDED: &[FieldSpec] = &[
    FieldSpec {
        name: "termination_for_cause",
        description: "Grounds for termination due to breach or default",
    },
    FieldSpec {
        name: "termination_for_convenience",
        description: "Right to terminate without cause",
    },
    FieldSpec {
        name: "transition_assistance",
        description: "Obligations to help transition to new provider",
    },
    FieldSpec {
        name: "survival_clauses",
        description: "Provisions that survive contract termination",
    },
];

const IP_EXTENDED: &[FieldSpec] = &[
    FieldSpec {
        name: "background_ip",
        description: "Pre-existing intellectual property each party brings",
    },
    FieldSpec {
        name: "foreground_ip",
        description: "New IP created during the contract",
    },
    FieldSpec {
        name: "joint_ip",
        description: "Jointly developed intellectual property ownership",
    },
    FieldSpec {
        name: "moral_rights_waiver",
        description: "Waiver of moral rights to creative works",
    },
    FieldSpec {
        name: "source_code_escrow",
        description: "Source code escrow arrangements for software",
    },
];

const COMMERCIAL_TERMS: &[FieldSpec] = &[
    FieldSpec {
        name: "exclusivity",
        description: "Exclusive dealing or exclusivity provisions",
    },
    FieldSpec {
        name: "territory_restrictions",
        description: "Geographic limitations on rights or operations",
    },
    FieldSpec {
        name: "volume_commitments",
        description: "Minimum purchase or volume requirements",
    },
    FieldSpec {
        name: "price_adjustments",
        description: "Price escalation clauses or adjustment mechanisms",
    },
    FieldSpec {
        name: "benchmarking_rights",
        description: "Right to benchmark pricing against market",
    },
];

const RELATIONSHIP_TERMS: &[FieldSpec] = &[
    FieldSpec {
        name: "subcontracting_rights",
        description: "Whether and how subcontracting is permitted",
    },
    FieldSpec {
        name: "key_personnel",
        description: "Named individuals critical to performance",
    },
    FieldSpec {
        name: "governance_structure",
        description: "Joint steering committees or governance bodies",
    },
    FieldSpec {
        name: "reporting_requirements",
        description: "Required reports, frequency, and format",
    },
];

const CATEGORIES: &[FieldCategory] = &[
    FieldCategory {
        key: "dates_parties",
        label: "CORE DATES & PARTIES",
        fields: DATES_PARTIES,
    },
    FieldCategory {
        key: "financial_basic",
        label: "FINANCIAL TERMS",
        fields: FINANCIAL_BASIC,
    },
    FieldCategory {
        key: "termination_basic",
        label: "TERMINATION & RENEWAL",
        fields: TERMINATION_BASIC,
    },
    FieldCategory {
        key: "liability_basic",
        label: "LIABILITY & RISK",
        fields: LIABILITY_BASIC,
    },
    FieldCategory {
        key: "performance_basic",
        label: "PERFORMANCE & OBLIGATIONS",
        fields: PERFORMANCE_BASIC,
    },
    FieldCategory {
        key: "ip_basic",
        label: "INTELLECTUAL PROPERTY",
        fields: IP_BASIC,
    },
    FieldCategory {
        key: "compliance_basic",
        label: "COMPLIANCE & DISPUTE",
        fields: COMPLIANCE_BASIC,
    },
    FieldCategory {
        key: "administrative_basic",
        label: "ADMINISTRATIVE",
        fields: ADMINISTRATIVE_BASIC,
    },
    FieldCategory {
        key: "payment_workflow",
        label: "PAYMENT WORKFLOW",
        fields: PAYMENT_WORKFLOW,
    },
    FieldCategory {
        key: "compliance_extended",
        label: "COMPLIANCE EXTENDED",
        fields: COMPLIANCE_EXTENDED,
    },
    FieldCategory {
        key: "performance_extended",
        label: "PERFORMANCE EXTENDED",
        fields: PERFORMANCE_EXTENDED,
    },
    FieldCategory {
        key: "risk_management",
        label: "RISK MANAGEMENT",
        fields: RISK_MANAGEMENT,
    },
    FieldCategory {
        key: "termination_extended",
        label: "TERMINATION EXTENDED",
        fields: TERMINATION_EXTENDED,
    },
    FieldCategory {
        key: "ip_extended",
        label: "IP EXTENDED",
        fields: IP_EXTENDED,
    },
    FieldCategory {
        key: "commercial_terms",
        label: "COMMERCIAL TERMS",
        fields: COMMERCIAL_TERMS,
    },
    FieldCategory {
        key: "relationship_terms",
        label: "RELATIONSHIP TERMS",
        fields: RELATIONSHIP_TERMS,
    },
];

/// Fields whose values are calculated or consolidated from multiple
/// passages. They are exempt from strict single-citation grounding.
const DERIVED_FIELDS: &[&str] = &[
    "total_contract_value",
    "payment_terms",
    "parties",
    "renewal_terms",
    "deliverables",
    "sla_terms",
    "payment_milestones",
    "remedies",
];

/// Process-wide field configuration, constructed once at startup and passed
/// explicitly to the orchestrator and prompt builder.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    categories: &'static [FieldCategory],
}

impl FieldCatalog {
    pub fn builtin() -> Self {
        Self {
            categories: CATEGORIES,
        }
    }

    pub fn categories(&self) -> &[FieldCategory] {
        self.categories
    }

    pub fn lookup(&self, name: &str) -> Option<&'static FieldSpec> {
        self.categories
            .iter()
            .flat_map(|category| category.fields.iter())
            .find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn description(&self, name: &str) -> &'static str {
        self.lookup(name).map(|field| field.description).unwrap_or("")
    }

    pub fn field_type(&self, name: &str) -> FieldType {
        if DERIVED_FIELDS.contains(&name) {
            FieldType::Derived
        } else {
            FieldType::Extractive
        }
    }

    pub fn field_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.fields.len())
            .sum()
    }

    /// Field names for a tier, in catalog category order.
    pub fn tier_fields(&self, tier: Tier) -> Vec<&'static str> {
        let category_keys: &[&str] = match tier {
            Tier::Essential => &["dates_parties", "financial_basic", "termination_basic"],
            Tier::Professional | Tier::Enterprise => &[
                "dates_parties",
                "financial_basic",
                "termination_basic",
                "liability_basic",
                "performance_basic",
            ],
            Tier::Full => {
                return self
                    .categories
                    .iter()
                    .flat_map(|category| category.fields.iter().map(|field| field.name))
                    .collect();
            }
        };

        let mut fields: Vec<&'static str> = self
            .categories
            .iter()
            .filter(|category| category_keys.contains(&category.key))
            .flat_map(|category| category.fields.iter().map(|field| field.name))
            .collect();

        match tier {
            // Professional is the five basic categories plus ip_ownership
            // to land on 18 fields.
            Tier::Professional => fields.push("ip_ownership"),
            Tier::Enterprise => {
                for key in ["ip_basic", "compliance_basic"] {
                    if let Some(category) =
                        self.categories.iter().find(|category| category.key == key)
                    {
                        fields.extend(category.fields.iter().map(|field| field.name));
                    }
                }
            }
            _ => {}
        }

        fields
    }
}

/// A validated extraction request: which fields, at what cost.
#[derive(Debug, Clone)]
pub struct FieldSelection {
    pub label: String,
    pub fields: Vec<&'static str>,
    pub credits: u32,
    pub warnings: Vec<String>,
}

/// Resolve a tier or a custom field list against the catalog. Unknown custom
/// fields are dropped with a warning; an all-unknown list falls back to the
/// essential tier. Over-cap selections are rejected outright.
pub fn resolve_selection(
    catalog: &FieldCatalog,
    tier: Tier,
    custom_fields: &[String],
) -> Result<FieldSelection, ConfigError> {
    if custom_fields.is_empty() {
        return Ok(FieldSelection {
            label: tier.as_str().to_string(),
            fields: catalog.tier_fields(tier),
            credits: tier.credits(),
            warnings: Vec::new(),
        });
    }

    if custom_fields.len() > MAX_CUSTOM_FIELDS {
        return Err(ConfigError::TooManyFields {
            requested: custom_fields.len(),
            max: MAX_CUSTOM_FIELDS,
        });
    }

    let mut warnings = Vec::new();
    let requested: HashSet<&str> = custom_fields.iter().map(String::as_str).collect();
    let mut unknown: Vec<&str> = requested
        .iter()
        .copied()
        .filter(|name| !catalog.contains(name))
        .collect();
    unknown.sort_unstable();
    if !unknown.is_empty() {
        let message = format!("ignoring unknown custom fields: {}", unknown.join(", "));
        warn!("{message}");
        warnings.push(message);
    }

    // Catalog order keeps prompts and reports deterministic.
    let fields: Vec<&'static str> = catalog
        .categories()
        .iter()
        .flat_map(|category| category.fields.iter().map(|field| field.name))
        .filter(|name| requested.contains(name))
        .collect();

    if fields.is_empty() {
        warnings.push("no valid custom fields, falling back to essential tier".to_string());
        warn!("no valid custom fields, falling back to essential tier");
        return Ok(FieldSelection {
            label: Tier::Essential.as_str().to_string(),
            fields: catalog.tier_fields(Tier::Essential),
            credits: Tier::Essential.credits(),
            warnings,
        });
    }

    let credits = calculate_custom_credits(fields.len())?;
    Ok(FieldSelection {
        label: "custom".to_string(),
        fields,
        credits,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_sizes_match_the_published_plans() {
        let catalog = FieldCatalog::builtin();
        assert_eq!(catalog.tier_fields(Tier::Essential).len(), 9);
        assert_eq!(catalog.tier_fields(Tier::Professional).len(), 18);
        assert_eq!(catalog.tier_fields(Tier::Enterprise).len(), 25);
        assert_eq!(catalog.tier_fields(Tier::Full).len(), catalog.field_count());
    }

    #[test]
    fn tiers_are_nested_supersets() {
        let catalog = FieldCatalog::builtin();
        let essential: HashSet<&str> = catalog.tier_fields(Tier::Essential).into_iter().collect();
        let professional: HashSet<&str> =
            catalog.tier_fields(Tier::Professional).into_iter().collect();
        let enterprise: HashSet<&str> =
            catalog.tier_fields(Tier::Enterprise).into_iter().collect();

        assert!(essential.is_subset(&professional));
        assert!(professional.is_subset(&enterprise));
        assert!(professional.contains("ip_ownership"));
    }

    #[test]
    fn custom_credit_schedule() {
        assert_eq!(calculate_custom_credits(1).unwrap(), 1);
        assert_eq!(calculate_custom_credits(9).unwrap(), 1);
        assert_eq!(calculate_custom_credits(10).unwrap(), 3);
        assert_eq!(calculate_custom_credits(18).unwrap(), 3);
        assert_eq!(calculate_custom_credits(19).unwrap(), 5);
        assert_eq!(calculate_custom_credits(25).unwrap(), 5);
        assert!(matches!(
            calculate_custom_credits(26),
            Err(ConfigError::TooManyFields {
                requested: 26,
                max: MAX_CUSTOM_FIELDS
            })
        ));
    }

    #[test]
    fn unknown_tier_name_defaults_to_essential() {
        assert_eq!(Tier::from_name("platinum"), Tier::Essential);
        assert_eq!(Tier::from_name("enterprise"), Tier::Enterprise);
    }

    #[test]
    fn derived_taxonomy_is_applied() {
        let catalog = FieldCatalog::builtin();
        assert_eq!(catalog.field_type("payment_terms"), FieldType::Derived);
        assert_eq!(catalog.field_type("governing_law"), FieldType::Extractive);
    }

    #[test]
    fn custom_selection_keeps_known_fields_in_catalog_order() {
        let catalog = FieldCatalog::builtin();
        let requested = vec![
            "governing_law".to_string(),
            "made_up_field".to_string(),
            "effective_date".to_string(),
        ];

        let selection = resolve_selection(&catalog, Tier::Essential, &requested).unwrap();
        assert_eq!(selection.label, "custom");
        assert_eq!(selection.fields, vec!["effective_date", "governing_law"]);
        assert_eq!(selection.credits, 1);
        assert_eq!(selection.warnings.len(), 1);
        assert!(selection.warnings[0].contains("made_up_field"));
    }

    #[test]
    fn all_unknown_custom_fields_fall_back_to_essential() {
        let catalog = FieldCatalog::builtin();
        let requested = vec!["bogus_one".to_string(), "bogus_two".to_string()];

        let selection = resolve_selection(&catalog, Tier::Enterprise, &requested).unwrap();
        assert_eq!(selection.label, "essential");
        assert_eq!(selection.fields.len(), 9);
    }

    #[test]
    fn over_cap_custom_selection_is_rejected() {
        let catalog = FieldCatalog::builtin();
        let requested: Vec<String> = catalog
            .tier_fields(Tier::Full)
            .into_iter()
            .take(26)
            .map(String::from)
            .collect();

        assert!(resolve_selection(&catalog, Tier::Essential, &requested).is_err());
    }
}
