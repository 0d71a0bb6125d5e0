use tracing::info;

use crate::model::{PaymentScheduleEntry, Table, TableKind};

use super::backend::DocumentBackend;

/// Header vocabulary that marks a table as financial.
const PAYMENT_TABLE_KEYWORDS: &[&str] = &[
    "amount", "fee", "price", "cost", "payment", "rate", "milestone", "phase", "schedule",
    "date", "due", "total", "subtotal", "invoice", "billing",
];

const MAX_CONTEXT_ROWS: usize = 20;

/// Walk every page, classify each detected table, and drop degenerate ones
/// (fewer than two rows counting the header).
pub fn extract_tables(backend: &dyn DocumentBackend) -> Vec<Table> {
    let mut tables = Vec::new();

    for page_number in 1..=backend.page_count() {
        for (table_index, raw) in backend.page_tables(page_number).into_iter().enumerate() {
            if raw.len() < 2 {
                continue;
            }

            let headers: Vec<String> = raw[0].iter().map(|cell| cell.trim().to_string()).collect();
            let rows: Vec<Vec<String>> = raw[1..]
                .iter()
                .map(|row| row.iter().map(|cell| cell.trim().to_string()).collect())
                .collect();

            let kind = classify_table(&headers);
            info!(
                page = page_number,
                kind = kind.as_str(),
                rows = rows.len(),
                "extracted table"
            );

            tables.push(Table {
                page: page_number,
                table_index,
                kind,
                headers,
                rows,
            });
        }
    }

    tables
}

/// Two or more distinct financial keywords in the headers make a table
/// financial; milestone/phase/schedule vocabulary narrows it to a payment
/// schedule, otherwise it is a fee table. Party-ish headers win next.
pub fn classify_table(headers: &[String]) -> TableKind {
    let header_text = headers.join(" ").to_lowercase();

    let keyword_hits = PAYMENT_TABLE_KEYWORDS
        .iter()
        .filter(|keyword| header_text.contains(*keyword))
        .count();

    if keyword_hits >= 2 {
        let scheduled = ["milestone", "phase", "schedule"]
            .iter()
            .any(|keyword| header_text.contains(keyword));
        return if scheduled {
            TableKind::PaymentSchedule
        } else {
            TableKind::FeeTable
        };
    }

    let party_like = ["party", "name", "entity", "signatory"]
        .iter()
        .any(|keyword| header_text.contains(keyword));
    if party_like {
        return TableKind::PartyTable;
    }

    TableKind::Generic
}

/// Render the financial tables as a prompt appendix. Non-financial tables
/// are omitted; long tables are capped at twenty rows.
pub fn format_tables_for_llm(tables: &[Table]) -> String {
    let financial: Vec<&Table> = tables
        .iter()
        .filter(|table| {
            matches!(table.kind, TableKind::PaymentSchedule | TableKind::FeeTable)
        })
        .collect();

    if financial.is_empty() {
        return String::new();
    }

    let mut rendered = String::from("\n\n═══ EXTRACTED PAYMENT/FEE TABLES ═══\n");
    for table in financial {
        rendered.push_str(&format!(
            "\n[{} - Page {}]\n",
            table.kind.as_str().to_uppercase(),
            table.page
        ));
        rendered.push_str(&table.headers.join(" | "));
        rendered.push('\n');
        rendered.push_str(&"-".repeat(40));
        rendered.push('\n');

        for row in table.rows.iter().take(MAX_CONTEXT_ROWS) {
            rendered.push_str(&row.join(" | "));
            rendered.push('\n');
        }
        if table.rows.len() > MAX_CONTEXT_ROWS {
            rendered.push_str(&format!(
                "... and {} more rows\n",
                table.rows.len() - MAX_CONTEXT_ROWS
            ));
        }
    }

    rendered
}

/// Flatten payment-schedule tables into milestone/amount/date entries by
/// matching header vocabulary to columns. Rows with neither an amount nor
/// a milestone are dropped.
pub fn normalize_payment_schedule(tables: &[Table]) -> Vec<PaymentScheduleEntry> {
    let mut entries = Vec::new();

    for table in tables {
        if table.kind != TableKind::PaymentSchedule {
            continue;
        }

        let amount_column = find_column(&table.headers, &["amount", "fee", "price", "cost", "payment"]);
        let date_column = find_column(&table.headers, &["date", "due", "when"]);
        let milestone_column = find_column(
            &table.headers,
            &["milestone", "phase", "deliverable", "description", "item"],
        );

        for row in &table.rows {
            let amount = cell_at(row, amount_column);
            let date = cell_at(row, date_column);
            let milestone = cell_at(row, milestone_column);

            if amount.is_empty() && milestone.is_empty() {
                continue;
            }

            entries.push(PaymentScheduleEntry {
                milestone,
                amount,
                date,
                page: table.page,
            });
        }
    }

    entries
}

fn find_column(headers: &[String], keywords: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let header = header.to_lowercase();
        keywords.iter().any(|keyword| header.contains(keyword))
    })
}

fn cell_at(row: &[String], column: Option<usize>) -> String {
    column
        .and_then(|index| row.get(index))
        .map(|cell| cell.trim().to_string())
        .unwrap_or_default()
}
