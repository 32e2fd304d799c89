//! Amount and subtotal candidates.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::{blacklisted, Candidate, PatternLibrary, Scanner, Tags};
use crate::models::receipt::Field;
use crate::receipt::document::Document;

/// Collect money candidates for `field` (amount, subtotal or tax) from
/// every rule of every tier.
pub fn candidates(
    scanner: &mut Scanner<'_>,
    library: &PatternLibrary,
    document: &Document<'_>,
    field: Field,
) -> Vec<Candidate<Decimal>> {
    let text = document.text();
    let mut found = Vec::new();

    for spec in library.for_field(field) {
        for m in scanner.matches(spec) {
            let Some(value) = parse_money(m.value) else {
                continue;
            };
            if value.is_zero() {
                continue;
            }

            let tags = Tags {
                blacklisted: blacklisted(text, m.whole.start),
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

/// Parse a money value in any common notation (`1,234.56`, `1.234,56`,
/// `1 234,56`, `1234.56`). Whole values (`15`, `1,200`) parse without cents;
/// a final group of three digits is thousands grouping.
pub fn parse_money(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let Some(separator) = cleaned.rfind([',', '.']) else {
        return Decimal::from_str(&cleaned).ok();
    };
    let (integer, fraction) = (&cleaned[..separator], &cleaned[separator + 1..]);
    if integer.is_empty() {
        return None;
    }
    if fraction.len() == 3 {
        let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
        return Decimal::from_str(&digits).ok();
    }
    if fraction.len() != 2 {
        return None;
    }

    let integer: String = integer.chars().filter(|c| c.is_ascii_digit()).collect();
    Decimal::from_str(&format!("{}.{}", integer, fraction)).ok()
}

/// Format a money value with thousands separators (`1,234.56`).
pub fn format_money(amount: Decimal) -> String {
    let s = amount.round_dp(2).to_string();
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let fraction = format!("{:0<2}", fraction);

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    format!("{}{}.{}", sign, grouped, fraction)
}
