//! Tax line candidates.

use rust_decimal::Decimal;

use super::amounts::{format_money, parse_money};
use super::{blacklisted_on_line, preceding_word, Candidate, PatternLibrary, Scanner, Tags};
use crate::models::receipt::Field;
use crate::receipt::document::Document;

/// Rule whose matches restate the itemized taxes.
const RESTATEMENT_RULE: &str = "tax_total";

/// Words that turn a tax line into a restatement ("Total Tax").
const RESTATEMENT_WORDS: &[&str] = &["total", "combined", "overall"];

/// Collect tax line candidates. Every match is kept; de-duplication and
/// summation happen after scoring.
pub fn candidates(
    scanner: &mut Scanner<'_>,
    library: &PatternLibrary,
    document: &Document<'_>,
) -> Vec<Candidate<Decimal>> {
    let text = document.text();
    let mut found = Vec::new();

    for spec in library.for_field(Field::Tax) {
        for m in scanner.matches(spec) {
            let Some(value) = parse_money(m.value).filter(|v| !v.is_zero()) else {
                continue;
            };

            let restatement = spec.name() == RESTATEMENT_RULE
                || preceding_word(text, m.whole.start)
                    .is_some_and(|w| RESTATEMENT_WORDS.contains(&w.as_str()));

            let tags = Tags {
                blacklisted: blacklisted_on_line(text, m.whole.start),
                restatement,
                ..Tags::default()
            };

            found.push(
                Candidate::new(value, spec.name(), spec.priority(), m.raw)
                    .with_span(m.span)
                    .with_line(document.line_of(m.span.start))
                    .with_normalized(format_money(value))
                    .with_tags(tags),
            );
        }
    }

    found
}
