//! Overall confidence and the review gate.

use std::collections::BTreeMap;

use crate::models::receipt::{Field, ParseResult, Warning};

/// Field weights of the aggregate.
const WEIGHTS: &[(Field, f32)] = &[
    (Field::Vendor, 0.25),
    (Field::Amount, 0.35),
    (Field::Date, 0.25),
    (Field::Currency, 0.05),
    (Field::Tax, 0.10),
];

/// Multiplier applied once per penalizing warning.
pub const WARNING_PENALTY: f32 = 0.95;

/// Minimum confidence of the vendor and amount fields.
pub const CRITICAL_FIELD_THRESHOLD: f32 = 0.70;

/// Fields always counted in the denominator, present or not.
fn always_weighted(field: Field) -> bool {
    matches!(field, Field::Vendor | Field::Amount | Field::Date)
}

/// Weighted mean of per-field confidences. A missing vendor, amount or
/// date counts as zero; missing currency and tax are left out.
pub fn aggregate(field_confidence: &BTreeMap<Field, f32>, warnings: &[Warning]) -> f32 {
    let mut weighted = 0.0;
    let mut denominator = 0.0;

    for &(field, weight) in WEIGHTS {
        match field_confidence.get(&field) {
            Some(confidence) => {
                weighted += weight * confidence.clamp(0.0, 1.0);
                denominator += weight;
            }
            None if always_weighted(field) => denominator += weight,
            None => {}
        }
    }

    let penalties = warnings.iter().filter(|w| w.penalizes()).count();
    let overall = weighted / denominator * WARNING_PENALTY.powi(penalties as i32);
    overall.clamp(0.0, 1.0)
}

/// Reasons a result needs human review; empty when it can be trusted.
pub fn review_reasons(result: &ParseResult, threshold: f32) -> Vec<String> {
    let mut reasons = Vec::new();

    if result.confidence < threshold {
        reasons.push(format!(
            "overall confidence {:.2} below {:.2}",
            result.confidence, threshold
        ));
    }
    for (field, present) in [
        (Field::Vendor, result.vendor.is_some()),
        (Field::Amount, result.amount.is_some()),
    ] {
        if !present {
            reasons.push(format!("{} missing", field));
        } else if result.confidence_of(field) < CRITICAL_FIELD_THRESHOLD {
            reasons.push(format!(
                "{} confidence {:.2} below {:.2}",
                field,
                result.confidence_of(field),
                CRITICAL_FIELD_THRESHOLD
            ));
        }
    }
    if result.consistency_failed() {
        reasons.push("subtotal + tax does not match amount".to_string());
    }

    reasons
}

/// Set the overall confidence, review flag and reason on a result.
pub fn apply(result: &mut ParseResult, threshold: f32) {
    result.confidence = aggregate(&result.field_confidence, &result.warnings);
    let reasons = review_reasons(result, threshold);
    result.needs_review = !reasons.is_empty();
    result.review_reason = (!reasons.is_empty()).then(|| reasons.join("; "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn confidences(pairs: &[(Field, f32)]) -> BTreeMap<Field, f32> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_aggregate_excludes_absent_optional_fields() {
        let all = confidences(&[(Field::Vendor, 1.0), (Field::Amount, 1.0), (Field::Date, 1.0)]);
        assert!((aggregate(&all, &[]) - 1.0).abs() < 1e-6);

        let no_date = confidences(&[(Field::Vendor, 1.0), (Field::Amount, 1.0)]);
        assert!((aggregate(&no_date, &[]) - 0.60 / 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_scales_by_field_confidence() {
        let high = confidences(&[(Field::Vendor, 0.9), (Field::Amount, 0.9), (Field::Date, 0.9)]);
        let low = confidences(&[(Field::Vendor, 0.9), (Field::Amount, 0.4), (Field::Date, 0.9)]);
        assert!(aggregate(&high, &[]) > aggregate(&low, &[]));
    }

    #[test]
    fn test_penalizing_warnings() {
        let fields = confidences(&[(Field::Vendor, 1.0), (Field::Amount, 1.0), (Field::Date, 1.0)]);
        let defaulted = Warning::CurrencyDefaulted { code: "USD".to_string() };
        let penalized = aggregate(&fields, &[defaulted]);
        assert!((penalized - 0.95).abs() < 1e-6);

        let neutral = aggregate(&fields, &[Warning::MissingField { field: Field::Tax }]);
        assert!((neutral - 1.0).abs() < 1e-6);

        let honest_null = aggregate(&fields, &[Warning::CurrencyNoEvidence]);
        assert!((honest_null - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_review_gate() {
        let mut result = ParseResult {
            vendor: Some("Uber".to_string()),
            amount: Some(Decimal::new(1413, 2)),
            field_confidence: confidences(&[
                (Field::Vendor, 0.9),
                (Field::Amount, 0.9),
                (Field::Date, 0.9),
            ]),
            ..ParseResult::default()
        };
        apply(&mut result, 0.70);
        assert!(!result.needs_review);
        assert_eq!(result.review_reason, None);

        result.field_confidence.insert(Field::Vendor, 0.5);
        apply(&mut result, 0.70);
        assert!(result.needs_review);
        assert!(result.review_reason.as_deref().unwrap().contains("vendor confidence"));

        result.field_confidence.insert(Field::Vendor, 0.9);
        result.amount = None;
        result.field_confidence.remove(&Field::Amount);
        apply(&mut result, 0.70);
        assert!(result.review_reason.as_deref().unwrap().contains("amount missing"));
    }

    #[test]
    fn test_consistency_failure_forces_review() {
        let mut result = ParseResult {
            vendor: Some("Shop".to_string()),
            amount: Some(Decimal::new(1000, 2)),
            field_confidence: confidences(&[
                (Field::Vendor, 1.0),
                (Field::Amount, 1.0),
                (Field::Date, 1.0),
            ]),
            warnings: vec![Warning::ConsistencyFailed {
                amount: Decimal::new(1000, 2),
                subtotal: Decimal::new(500, 2),
                tax: Decimal::new(50, 2),
            }],
            ..ParseResult::default()
        };
        apply(&mut result, 0.70);
        assert!(result.confidence > 0.70);
        assert!(result.needs_review);
    }
}
