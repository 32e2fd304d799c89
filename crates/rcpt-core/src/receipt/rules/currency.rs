//! Currency candidates. A bare `$` is not evidence of any one currency.

use super::patterns::CANADIAN_TAX;
use super::{Candidate, PatternLibrary, Scanner};
use crate::models::receipt::{Field, ParseContext};
use crate::receipt::document::Document;

pub const TAX_REGIME_HINT: &str = "tax_regime_hint";
pub const LOCALE_HINT: &str = "locale_hint";

/// Priority of hint-only candidates.
const HINT_PRIORITY: u8 = 4;

/// Dollar currency implied by a locale region.
const DOLLAR_REGIONS: &[(&str, &str)] = &[("US", "USD"), ("CA", "CAD"), ("AU", "AUD"), ("NZ", "NZD")];

/// Collect currency candidates: explicit codes and symbols from the text,
/// then hints that only apply when the text uses `$`.
pub fn candidates(
    scanner: &mut Scanner<'_>,
    library: &PatternLibrary,
    document: &Document<'_>,
    context: Option<&ParseContext>,
) -> Vec<Candidate<String>> {
    let text = document.text();
    let mut found = Vec::new();

    for spec in library.for_field(Field::Currency) {
        for m in scanner.matches(spec) {
            let Some(code) = currency_code(m.value) else {
                continue;
            };
            found.push(
                Candidate::new(code.to_string(), spec.name(), spec.priority(), m.raw)
                    .with_span(m.span)
                    .with_line(document.line_of(m.span.start))
                    .with_normalized(code),
            );
        }
    }

    if !text.contains('$') {
        return found;
    }

    if let Some(m) = CANADIAN_TAX.find(text) {
        found.push(
            Candidate::new("CAD".to_string(), TAX_REGIME_HINT, HINT_PRIORITY, m.as_str())
                .with_normalized("CAD"),
        );
    }

    let region = context.and_then(ParseContext::locale_region);
    if let Some(region) = region {
        if let Some((_, code)) = DOLLAR_REGIONS.iter().find(|(r, _)| *r == region) {
            found.push(
                Candidate::new(code.to_string(), LOCALE_HINT, HINT_PRIORITY, region.clone())
                    .with_normalized(*code),
            );
        }
    }

    found
}

/// ISO code for a matched code, symbol or prefixed dollar sign.
pub fn currency_code(value: &str) -> Option<&'static str> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let code = match compact.as_str() {
        "€" => "EUR",
        "£" => "GBP",
        "¥" => "JPY",
        "₹" => "INR",
        "C$" | "CA$" | "CDN$" => "CAD",
        "A$" | "AU$" => "AUD",
        "US$" => "USD",
        "NZ$" => "NZD",
        "USD" => "USD",
        "CAD" => "CAD",
        "EUR" => "EUR",
        "GBP" => "GBP",
        "AUD" => "AUD",
        "NZD" => "NZD",
        "JPY" => "JPY",
        "CHF" => "CHF",
        "INR" => "INR",
        "MXN" => "MXN",
        _ => return None,
    };
    Some(code)
}
