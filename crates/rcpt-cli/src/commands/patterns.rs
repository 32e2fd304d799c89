//! Patterns command - list the extraction rules.

use clap::Args;
use console::style;
use serde::Serialize;

use rcpt_core::PatternLibrary;
use rcpt_core::models::receipt::Field;
use rcpt_core::receipt::rules::vendor::STRUCTURAL_RULES;

/// Arguments for the patterns command.
#[derive(Args)]
pub struct PatternsArgs {
    /// Only list rules for this field (vendor, amount, subtotal, tax, date, currency)
    #[arg(long)]
    field: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct PatternRow {
    field: Field,
    priority: u8,
    name: String,
    example: String,
    note: String,
}

pub async fn run(args: PatternsArgs) -> anyhow::Result<()> {
    let field = match args.field.as_deref() {
        Some(name) => Some(
            Field::from_name(name).ok_or_else(|| anyhow::anyhow!("Unknown field: {}", name))?,
        ),
        None => None,
    };

    let rows = collect_rows(&PatternLibrary::shared(), field);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut current = None;
    for row in &rows {
        if current != Some(row.field) {
            if current.is_some() {
                println!();
            }
            println!("{}", style(row.field.as_str().to_uppercase()).bold());
            current = Some(row.field);
        }
        println!(
            "  [{}] {:<28} {}",
            row.priority,
            style(&row.name).cyan(),
            row.note
        );
        if !row.example.is_empty() {
            println!("      e.g. {}", style(&row.example).dim());
        }
    }

    Ok(())
}

/// Library rules plus the structural vendor rules, grouped by field.
fn collect_rows(library: &PatternLibrary, field: Option<Field>) -> Vec<PatternRow> {
    let mut rows: Vec<PatternRow> = library
        .iter()
        .map(|spec| PatternRow {
            field: spec.field(),
            priority: spec.priority(),
            name: spec.name().to_string(),
            example: spec.example().to_string(),
            note: spec.note().to_string(),
        })
        .chain(STRUCTURAL_RULES.iter().map(|rule| PatternRow {
            field: Field::Vendor,
            priority: rule.priority,
            name: rule.name.to_string(),
            example: String::new(),
            note: rule.note.to_string(),
        }))
        .filter(|row| field.is_none_or(|f| row.field == f))
        .collect();

    rows.sort_by_key(|row| (row.field, row.priority));
    rows
}
