//! Provenance recording.

use std::collections::BTreeMap;

use super::select::{Selection, to_alternative};
use super::validate::TaxTotal;
use crate::models::receipt::{Alternative, Field, FieldProvenance, Provenance, Warning};

/// Collects per-field decisions while a document is parsed.
#[derive(Debug, Default)]
pub struct ProvenanceRecorder {
    fields: BTreeMap<Field, FieldProvenance>,
    tax_lines: Vec<Alternative>,
    forwarded: bool,
    spacing_repaired: bool,
}

impl ProvenanceRecorder {
    pub fn new(forwarded: bool, spacing_repaired: bool) -> Self {
        Self {
            forwarded,
            spacing_repaired,
            ..Self::default()
        }
    }

    /// Record the outcome of a single-winner field.
    pub fn selection<T>(&mut self, field: Field, selection: &Selection<T>) {
        self.fields.insert(
            field,
            FieldProvenance {
                pattern: selection.pattern().map(str::to_string),
                priority: selection.priority(),
                confidence: selection.confidence,
                candidate_count: selection.candidate_count,
                alternatives: selection.alternatives.clone(),
            },
        );
    }

    /// Record the summed tax; `candidate_count` counts every tax candidate.
    pub fn tax(&mut self, total: Option<&TaxTotal>, candidate_count: usize) {
        let entry = match total {
            Some(total) => {
                self.tax_lines = total.lines.iter().map(to_alternative).collect();
                FieldProvenance {
                    pattern: Some(total.pattern()),
                    priority: total.priority(),
                    confidence: total.confidence,
                    candidate_count,
                    alternatives: Vec::new(),
                }
            }
            None => FieldProvenance {
                candidate_count,
                ..FieldProvenance::default()
            },
        };
        self.fields.insert(Field::Tax, entry);
    }

    pub fn finish(self, warnings: &[Warning]) -> Provenance {
        Provenance {
            fields: self.fields,
            tax_lines: self.tax_lines,
            warnings: warnings.iter().map(ToString::to_string).collect(),
            forwarded: self.forwarded,
            spacing_repaired: self.spacing_repaired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::Span;
    use crate::receipt::rules::Candidate;
    use crate::receipt::scoring::ScoredCandidate;
    use crate::receipt::select::select;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    #[test]
    fn test_records_winner_and_alternatives() {
        let scored = vec![
            ScoredCandidate {
                candidate: Candidate::new("Uber".to_string(), "merchant_phrase", 2, "Uber")
                    .with_span(Span::new(14, 18))
                    .with_normalized("Uber"),
                score: 0.8,
                rationale: "base 0.47, position +0.20 = 0.67".to_string(),
            },
            ScoredCandidate {
                candidate: Candidate::new("Jane Doe".to_string(), "from_header", 1, "Jane Doe")
                    .with_normalized("Jane Doe"),
                score: 0.1,
                rationale: String::new(),
            },
        ];
        let selection = select(scored, 3);

        let mut recorder = ProvenanceRecorder::new(true, false);
        recorder.selection(Field::Vendor, &selection);
        recorder.tax(None, 0);
        let provenance = recorder.finish(&[Warning::CurrencyNoEvidence]);

        let vendor = &provenance.fields[&Field::Vendor];
        assert_eq!(vendor.pattern.as_deref(), Some("merchant_phrase"));
        assert_eq!(vendor.priority, Some(2));
        assert_eq!(vendor.candidate_count, 2);
        assert_eq!(vendor.alternatives.len(), 2);
        assert_eq!(provenance.fields[&Field::Tax].pattern, None);
        assert_eq!(provenance.warnings, vec!["currency: no strong evidence".to_string()]);
        assert!(provenance.forwarded);
    }

    #[test]
    fn test_records_tax_lines() {
        let line = |value: i64, start: usize| ScoredCandidate {
            candidate: Candidate::new(Decimal::new(value, 2), "tax_labeled", 1, "")
                .with_span(Span::new(start, start + 4))
                .with_normalized(format!("{}", Decimal::new(value, 2))),
            score: 0.7,
            rationale: String::new(),
        };
        let total = TaxTotal {
            total: Decimal::new(732, 2),
            confidence: 0.7,
            lines: vec![line(262, 10), line(470, 30)],
        };

        let mut recorder = ProvenanceRecorder::new(false, false);
        recorder.tax(Some(&total), 3);
        let provenance = recorder.finish(&[]);

        assert_eq!(provenance.tax_lines.len(), 2);
        assert_eq!(provenance.tax_lines[0].value, "2.62");
        assert_eq!(provenance.fields[&Field::Tax].candidate_count, 3);
    }
}
