//! Parse command - extract fields from a single receipt text.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use rcpt_core::models::receipt::{CurrencyEvidence, Field, ParseContext, ParseResult};
use rcpt_core::receipt::rules::format_money;
use rcpt_core::{ReceiptEngine, ReceiptParser};

use super::config::load_config;

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Input text file, or `-` to read stdin
    #[arg(required = true)]
    input: PathBuf,

    /// Sender address, e.g. "Uber Receipts <noreply@uber.com>"
    #[arg(long)]
    sender: Option<String>,

    /// Subject line of the message
    #[arg(long)]
    subject: Option<String>,

    /// Sender domain
    #[arg(long)]
    sender_domain: Option<String>,

    /// Preferred locale, e.g. en-CA
    #[arg(long)]
    locale: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Include provenance: rules, scores and alternatives
    #[arg(long)]
    explain: bool,

    /// Show per-field confidence scores
    #[arg(long)]
    show_confidence: bool,

    /// Currency to report when the receipt gives no evidence
    #[arg(long)]
    default_currency: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ParseArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let text = read_input(&args.input)?;
    info!("Parsing {} ({} bytes)", args.input.display(), text.len());

    let context = build_context(&args);
    let engine = ReceiptEngine::new().with_config(config.engine.clone());
    let mut result = engine.parse(&text, context.as_ref());

    let default_currency = args
        .default_currency
        .as_deref()
        .or(config.output.default_currency.as_deref());
    if let Some(code) = default_currency {
        result = result.with_default_currency(code);
    }

    let output = format_result(&result, args.format, args.explain || config.output.explain)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_confidence {
        eprintln!();
        eprintln!(
            "{} Overall confidence: {:.1}%",
            style("ℹ").blue(),
            result.confidence * 100.0
        );
        for (field, confidence) in &result.field_confidence {
            eprintln!("   {:<9} {:.1}%", field, confidence * 100.0);
        }
        match &result.review_reason {
            Some(reason) => eprintln!("{} Needs review: {}", style("!").yellow(), reason),
            None => eprintln!("{} No review needed", style("✓").green()),
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Read receipt text from a file or stdin. Invalid UTF-8 is replaced.
pub fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        return Ok(String::from_utf8_lossy(&buffer).into_owned());
    }

    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    let data = fs::read(path)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn build_context(args: &ParseArgs) -> Option<ParseContext> {
    if args.sender.is_none()
        && args.subject.is_none()
        && args.sender_domain.is_none()
        && args.locale.is_none()
    {
        return None;
    }

    let mut context = ParseContext::new();
    context.sender_address = args.sender.clone();
    context.subject = args.subject.clone();
    context.sender_domain = args.sender_domain.clone();
    context.user_locale = args.locale.clone();
    Some(context)
}

pub fn format_result(result: &ParseResult, format: OutputFormat, explain: bool) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => format_json(result, explain),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result, explain)),
    }
}

fn format_json(result: &ParseResult, explain: bool) -> anyhow::Result<String> {
    let mut json = serde_json::to_value(result)?;
    if !explain {
        if let Some(object) = json.as_object_mut() {
            object.remove("provenance");
        }
    }
    Ok(serde_json::to_string_pretty(&json)?)
}

pub fn evidence_label(evidence: &CurrencyEvidence) -> String {
    match evidence {
        CurrencyEvidence::Parsed { pattern } => format!("parsed ({})", pattern),
        CurrencyEvidence::NoStrongEvidence => "no strong evidence".to_string(),
        CurrencyEvidence::Defaulted { code } => format!("defaulted ({})", code),
    }
}

fn format_csv(result: &ParseResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "vendor",
        "amount",
        "subtotal",
        "tax",
        "currency",
        "currency_evidence",
        "date",
        "confidence",
        "needs_review",
        "review_reason",
    ])?;

    wtr.write_record([
        result.vendor.clone().unwrap_or_default(),
        result.amount.map(|a| a.to_string()).unwrap_or_default(),
        result.subtotal.map(|s| s.to_string()).unwrap_or_default(),
        result.tax.map(|t| t.to_string()).unwrap_or_default(),
        result.currency.clone().unwrap_or_default(),
        evidence_label(&result.currency_evidence),
        result.date.map(|d| d.to_string()).unwrap_or_default(),
        format!("{:.2}", result.confidence),
        result.needs_review.to_string(),
        result.review_reason.clone().unwrap_or_default(),
    ])?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(result: &ParseResult, explain: bool) -> String {
    let mut output = String::new();
    let missing = || "-".to_string();
    let currency = result.currency.as_deref().unwrap_or("");

    output.push_str(&format!("Vendor:   {}\n", result.vendor.clone().unwrap_or_else(missing)));
    output.push_str(&format!(
        "Date:     {}\n",
        result.date.map(|d| d.to_string()).unwrap_or_else(missing)
    ));
    output.push('\n');

    for (label, value) in [
        ("Subtotal", result.subtotal),
        ("Tax", result.tax),
        ("Amount", result.amount),
    ] {
        let value = value.map(format_money).unwrap_or_else(missing);
        let line = format!("{:<9} {} {}", format!("{}:", label), value, currency);
        output.push_str(line.trim_end());
        output.push('\n');
    }
    output.push_str(&format!(
        "Currency: {}\n",
        evidence_label(&result.currency_evidence)
    ));
    output.push('\n');

    output.push_str(&format!("Confidence: {:.2}\n", result.confidence));
    match &result.review_reason {
        Some(reason) => output.push_str(&format!("Review:     needed ({})\n", reason)),
        None => output.push_str("Review:     not needed\n"),
    }

    if !result.warnings.is_empty() {
        output.push_str("\nWarnings:\n");
        for warning in &result.warnings {
            output.push_str(&format!("  - {}\n", warning));
        }
    }

    if explain {
        output.push_str("\nProvenance:\n");
        for field in Field::ALL {
            let Some(record) = result.provenance.fields.get(&field) else {
                continue;
            };
            output.push_str(&format!(
                "  {} <- {} (priority {}, confidence {:.2}, {} candidates)\n",
                field,
                record.pattern.as_deref().unwrap_or("none"),
                record.priority.map(|p| p.to_string()).unwrap_or_else(missing),
                record.confidence,
                record.candidate_count
            ));
            for alternative in &record.alternatives {
                output.push_str(&format!(
                    "      {:<24} {:.2}  {}\n",
                    alternative.value, alternative.score, alternative.rationale
                ));
            }
        }
        for line in &result.provenance.tax_lines {
            output.push_str(&format!("  tax line {} <- {}\n", line.value, line.pattern));
        }
        if result.provenance.forwarded {
            output.push_str("  forwarded message detected\n");
        }
    }

    output
}
