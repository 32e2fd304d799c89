//! Receipt parser: collects every candidate, scores, selects, validates
//! and aggregates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::models::config::EngineConfig;
use crate::models::receipt::*;

use super::confidence;
use super::document::Document;
use super::normalize::{normalize_with_report, Normalized};
use super::provenance::ProvenanceRecorder;
use super::rules::dates::{self, DateHints};
use super::rules::{amounts, currency, floor_char_boundary, tax, vendor, PatternLibrary, Scanner};
use super::scoring::{
    score_amounts, score_currencies, score_dates, score_subtotals, score_taxes, score_vendors,
};
use super::select::{select, Selection};
use super::validate::{check_consistency, sum_taxes};

/// Tier from which an amount winner is considered a last resort.
const LOW_PRIORITY_TIER: u8 = 4;

/// Trait for receipt parsing.
pub trait ReceiptParser {
    /// Parse receipt text. Never fails; missing fields are `None`.
    fn parse(&self, text: &str, context: Option<&ParseContext>) -> ParseResult;
}

/// Rule-based receipt engine. Cheap to clone and safe to share between threads.
#[derive(Debug, Clone)]
pub struct ReceiptEngine {
    config: EngineConfig,
    library: Arc<PatternLibrary>,
}

impl ReceiptEngine {
    /// Create an engine with the default configuration and the standard rules.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            library: PatternLibrary::shared(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the fallback order for ambiguous numeric dates.
    pub fn with_date_order(mut self, order: DateOrder) -> Self {
        self.config.default_date_order = order;
        self
    }

    /// Set the per-pattern time budget.
    pub fn with_pattern_timeout(mut self, timeout: Duration) -> Self {
        self.config.pattern_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Use a custom rule set.
    pub fn with_library(mut self, library: Arc<PatternLibrary>) -> Self {
        self.library = library;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    fn truncate<'t>(&self, text: &'t str, warnings: &mut Vec<Warning>) -> &'t str {
        let limit = self.config.max_input_bytes;
        if text.len() <= limit {
            return text;
        }
        warn!(bytes = text.len(), limit, "input truncated");
        warnings.push(Warning::InputTruncated { limit });
        &text[..floor_char_boundary(text, limit)]
    }
}

impl Default for ReceiptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn log_selection<T>(field: Field, selection: &Selection<T>) {
    match &selection.winner {
        Some(winner) => debug!(
            field = field.as_str(),
            pattern = %winner.candidate.pattern,
            score = winner.score,
            confidence = selection.confidence,
            candidates = selection.candidate_count,
            "selected"
        ),
        None => debug!(field = field.as_str(), "no candidates"),
    }
}

/// Record a selected value and its confidence.
fn take<T: Clone>(
    field: Field,
    selection: &Selection<T>,
    field_confidence: &mut BTreeMap<Field, f32>,
    alternatives: &mut BTreeMap<Field, Vec<Alternative>>,
) -> Option<T> {
    log_selection(field, selection);
    let value = selection.value().cloned()?;
    field_confidence.insert(field, selection.confidence);
    if !selection.alternatives.is_empty() {
        alternatives.insert(field, selection.alternatives.clone());
    }
    Some(value)
}

/// Report spans against the caller's text rather than the normalized one.
fn to_input_spans(alternatives: &mut [Alternative], normalized: &Normalized) {
    for alternative in alternatives {
        alternative.span = alternative.span.map(|span| normalized.source_span(span));
    }
}

fn missing<T>(field: Field, value: &Option<T>, warnings: &mut Vec<Warning>) {
    if value.is_none() {
        warnings.push(Warning::MissingField { field });
    }
}

impl ReceiptParser for ReceiptEngine {
    fn parse(&self, text: &str, context: Option<&ParseContext>) -> ParseResult {
        let started = Instant::now();
        info!(bytes = text.len(), "parsing receipt");

        let mut warnings = Vec::new();
        let input = self.truncate(text, &mut warnings);
        let normalized = normalize_with_report(input);
        let document = Document::analyze(&normalized.text, context);
        let library = self.library.as_ref();
        let max_alternatives = self.config.max_alternatives;

        // Generate
        let mut scanner = Scanner::new(document.text(), Duration::from_millis(self.config.pattern_timeout_ms));
        let amount_candidates = amounts::candidates(&mut scanner, library, &document, Field::Amount);
        let subtotal_candidates = amounts::candidates(&mut scanner, library, &document, Field::Subtotal);
        let tax_candidates = tax::candidates(&mut scanner, library, &document);
        let hints = DateHints {
            locale_region: context.and_then(ParseContext::locale_region),
            document_region: document.region(),
            default_order: self.config.default_date_order,
        };
        let date_candidates = dates::candidates(&mut scanner, library, &document, &hints);
        let vendor_candidates = vendor::candidates(&mut scanner, library, &document, context);
        let currency_candidates = currency::candidates(&mut scanner, library, &document, context);

        warnings.extend(
            scanner
                .timed_out()
                .iter()
                .map(|pattern| Warning::PatternTimeout { pattern: pattern.clone() }),
        );

        // Score and select
        let amount = select(score_amounts(amount_candidates, &document, &self.config), max_alternatives);
        let subtotal = select(score_subtotals(subtotal_candidates, &document), max_alternatives);
        let tax_count = tax_candidates.len();
        let tax_total = sum_taxes(score_taxes(tax_candidates, &document));
        let date = select(score_dates(date_candidates, &document), max_alternatives);
        let vendor = select(score_vendors(vendor_candidates, &document), max_alternatives);
        let amount_span = amount.winner.as_ref().and_then(|w| w.candidate.span);
        let currency = select(score_currencies(currency_candidates, amount_span), max_alternatives);

        let mut field_confidence = BTreeMap::new();
        let mut alternatives = BTreeMap::new();
        let vendor_value = take(Field::Vendor, &vendor, &mut field_confidence, &mut alternatives);
        let amount_value = take(Field::Amount, &amount, &mut field_confidence, &mut alternatives);
        let subtotal_value = take(Field::Subtotal, &subtotal, &mut field_confidence, &mut alternatives);
        let date_value = take(Field::Date, &date, &mut field_confidence, &mut alternatives);
        let currency_value = take(Field::Currency, &currency, &mut field_confidence, &mut alternatives);
        let tax_value = tax_total.as_ref().map(|total| {
            debug!(field = "tax", lines = total.lines.len(), total = %total.total, "summed");
            field_confidence.insert(Field::Tax, total.confidence);
            total.total
        });

        // Validate
        let currency_evidence = match currency.pattern() {
            Some(pattern) => CurrencyEvidence::Parsed {
                pattern: pattern.to_string(),
            },
            None => {
                warnings.push(Warning::CurrencyNoEvidence);
                CurrencyEvidence::NoStrongEvidence
            }
        };

        let resolution = date.winner.as_ref().and_then(|w| w.candidate.tags.date_resolution);
        if let Some(resolution) = resolution.filter(DateResolution::is_guess) {
            warnings.push(Warning::AmbiguousDate { resolution });
        }

        if let Some(winner) = amount.winner.as_ref().filter(|w| w.candidate.priority >= LOW_PRIORITY_TIER) {
            warnings.push(Warning::LowPriorityAmount {
                pattern: winner.candidate.pattern.clone(),
            });
        }

        if let (Some(amount), Some(subtotal), Some(tax)) = (amount_value, subtotal_value, tax_value) {
            warnings.extend(check_consistency(amount, subtotal, tax, &self.config));
        }

        missing(Field::Vendor, &vendor_value, &mut warnings);
        missing(Field::Amount, &amount_value, &mut warnings);
        missing(Field::Date, &date_value, &mut warnings);

        // Aggregate
        let mut result = ParseResult {
            vendor: vendor_value,
            amount: amount_value,
            subtotal: subtotal_value,
            tax: tax_value,
            currency: currency_value,
            currency_evidence,
            date: date_value,
            field_confidence,
            warnings,
            alternatives,
            ..ParseResult::default()
        };
        confidence::apply(&mut result, self.config.review_threshold);

        let mut recorder = ProvenanceRecorder::new(document.forwarded(), normalized.spacing_repaired);
        recorder.selection(Field::Vendor, &vendor);
        recorder.selection(Field::Amount, &amount);
        recorder.selection(Field::Subtotal, &subtotal);
        recorder.tax(tax_total.as_ref(), tax_count);
        recorder.selection(Field::Date, &date);
        recorder.selection(Field::Currency, &currency);
        result.provenance = recorder.finish(&result.warnings);

        for field_alternatives in result.alternatives.values_mut() {
            to_input_spans(field_alternatives, &normalized);
        }
        for field in result.provenance.fields.values_mut() {
            to_input_spans(&mut field.alternatives, &normalized);
        }
        to_input_spans(&mut result.provenance.tax_lines, &normalized);

        info!(
            confidence = result.confidence,
            needs_review = result.needs_review,
            warnings = result.warnings.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "parsed receipt"
        );
        if let Some(reason) = result.review_reason.as_deref() {
            debug!(%reason, "needs review");
        }

        result
    }
}
