//! Field validators: tax summation and the subtotal + tax = amount check.
//! Numeric date disambiguation lives with the date rules.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::warn;

use super::scoring::ScoredCandidate;
use super::select::rank;
use crate::models::config::EngineConfig;
use crate::models::receipt::Warning;

/// Tax lines scoring below this are not summed.
pub const MIN_TAX_LINE_SCORE: f32 = 0.4;

/// Summed tax with the lines that contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxTotal {
    pub total: Decimal,
    /// Mean score of the summed lines.
    pub confidence: f32,
    /// Summed lines in document order.
    pub lines: Vec<ScoredCandidate<Decimal>>,
}

impl TaxTotal {
    /// Rule names of the summed lines, joined with `+`.
    pub fn pattern(&self) -> String {
        let mut names: Vec<&str> = self.lines.iter().map(|l| l.candidate.pattern.as_str()).collect();
        names.dedup();
        names.join("+")
    }

    /// Strongest tier among the summed lines.
    pub fn priority(&self) -> Option<u8> {
        self.lines.iter().map(|l| l.candidate.priority).min()
    }
}

/// Sum tax lines. Candidates are de-duplicated by source span, so two taxes
/// on one line and two equal amounts on different lines all count.
/// Restatement lines are used only when nothing is itemized. Returns `None`
/// when the sum does not fit a `Decimal`.
pub fn sum_taxes(mut scored: Vec<ScoredCandidate<Decimal>>) -> Option<TaxTotal> {
    rank(&mut scored);

    let mut by_span: Vec<ScoredCandidate<Decimal>> = Vec::new();
    for candidate in scored {
        let span = candidate.candidate.span;
        match by_span.iter_mut().find(|kept| kept.candidate.span == span) {
            Some(kept) => kept.candidate.tags.restatement |= candidate.candidate.tags.restatement,
            None => by_span.push(candidate),
        }
    }

    let (restated, itemized): (Vec<_>, Vec<_>) = by_span
        .into_iter()
        .filter(|c| c.score >= MIN_TAX_LINE_SCORE)
        .partition(|c| c.candidate.tags.restatement);

    let mut lines = if itemized.is_empty() {
        restated.into_iter().take(1).collect::<Vec<_>>()
    } else {
        itemized
    };
    if lines.is_empty() {
        return None;
    }
    lines.sort_by_key(|l| l.candidate.span.map(|s| s.start));

    let Some(total) = lines
        .iter()
        .try_fold(Decimal::ZERO, |sum, l| sum.checked_add(l.candidate.value))
    else {
        warn!("Tax lines overflow when summed; tax left empty");
        return None;
    };
    let confidence = lines.iter().map(|l| l.score).sum::<f32>() / lines.len() as f32;

    Some(TaxTotal {
        total,
        confidence: confidence.clamp(0.0, 1.0),
        lines,
    })
}

/// Compare `subtotal + tax` with the amount within
/// `max(pct% of amount, floor)`. A mismatch is a warning only; values too
/// large to compare are skipped.
pub fn check_consistency(
    amount: Decimal,
    subtotal: Decimal,
    tax: Decimal,
    config: &EngineConfig,
) -> Option<Warning> {
    let pct = Decimal::from_f32(config.consistency_tolerance_pct).unwrap_or(Decimal::ONE);
    let floor = Decimal::from_f32(config.consistency_tolerance_floor).unwrap_or(Decimal::ZERO);
    let tolerance = amount
        .abs()
        .checked_mul(pct)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .max(floor);
    let difference = subtotal.checked_add(tax)?.checked_sub(amount)?;

    (difference.abs() > tolerance).then_some(Warning::ConsistencyFailed {
        amount,
        subtotal,
        tax,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::Span;
    use crate::receipt::rules::Candidate;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn tax_line(value: &str, score: f32, line: usize, start: usize) -> ScoredCandidate<Decimal> {
        ScoredCandidate {
            candidate: Candidate::new(dec(value), "tax_labeled", 1, value)
                .with_span(Span::new(start, start + value.len()))
                .with_line(line),
            score,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_split_taxes_are_summed() {
        let total = sum_taxes(vec![tax_line("2.62", 0.8, 3, 40), tax_line("4.70", 0.8, 4, 60)]).unwrap();
        assert_eq!(total.total, dec("7.32"));
        assert_eq!(total.lines.len(), 2);
    }

    #[test]
    fn test_equal_amounts_on_different_spans_both_count() {
        let total = sum_taxes(vec![tax_line("2.62", 0.8, 3, 40), tax_line("2.62", 0.7, 4, 60)]).unwrap();
        assert_eq!(total.total, dec("5.24"));
    }

    #[test]
    fn test_two_taxes_on_one_line_both_count() {
        let total = sum_taxes(vec![tax_line("2.62", 0.8, 3, 40), tax_line("4.70", 0.8, 3, 50)]).unwrap();
        assert_eq!(total.total, dec("7.32"));
        assert_eq!(total.lines.len(), 2);
    }

    #[test]
    fn test_overflowing_tax_sum_is_dropped() {
        let huge = Decimal::MAX.to_string();
        assert_eq!(sum_taxes(vec![tax_line(&huge, 0.8, 3, 40), tax_line(&huge, 0.8, 4, 80)]), None);
    }

    #[test]
    fn test_same_span_counted_once() {
        let mut overlapping = tax_line("2.62", 0.6, 3, 40);
        overlapping.candidate.pattern = "tax_pipe_row".to_string();
        let total = sum_taxes(vec![tax_line("2.62", 0.8, 3, 40), overlapping]).unwrap();
        assert_eq!(total.total, dec("2.62"));
        assert_eq!(total.pattern(), "tax_labeled");
    }

    #[test]
    fn test_restatement_only_when_nothing_itemized() {
        let mut restated = tax_line("7.32", 0.8, 6, 90);
        restated.candidate.tags.restatement = true;

        let total = sum_taxes(vec![
            tax_line("2.62", 0.8, 3, 40),
            tax_line("4.70", 0.8, 4, 60),
            restated.clone(),
        ])
        .unwrap();
        assert_eq!(total.total, dec("7.32"));
        assert_eq!(total.lines.len(), 2);

        let total = sum_taxes(vec![restated]).unwrap();
        assert_eq!(total.total, dec("7.32"));
    }

    #[test]
    fn test_weak_lines_ignored() {
        assert_eq!(sum_taxes(vec![tax_line("0.33", 0.1, 7, 120)]), None);
        let total = sum_taxes(vec![tax_line("0.33", 0.8, 4, 50), tax_line("0.33", 0.1, 7, 120)]).unwrap();
        assert_eq!(total.total, dec("0.33"));
    }

    #[test]
    fn test_consistency() {
        let config = EngineConfig::default();
        assert_eq!(check_consistency(dec("59.72"), dec("52.40"), dec("7.32"), &config), None);
        assert_eq!(check_consistency(dec("100.00"), dec("90.00"), dec("9.50"), &config), None);
        assert!(matches!(
            check_consistency(dec("153.84"), dec("134.95"), dec("6.75"), &config),
            Some(Warning::ConsistencyFailed { .. })
        ));
        assert!(check_consistency(dec("1.00"), dec("0.90"), dec("0.04"), &config).is_some());
        assert!(check_consistency(dec("1.00"), dec("0.90"), dec("0.06"), &config).is_none());
    }

    #[test]
    fn test_consistency_skips_values_too_large_to_compare() {
        let config = EngineConfig::default();
        assert_eq!(check_consistency(Decimal::MAX, Decimal::MAX, Decimal::MAX, &config), None);
        assert_eq!(check_consistency(dec("1.00"), Decimal::MAX, dec("1.00"), &config), None);
    }
}
