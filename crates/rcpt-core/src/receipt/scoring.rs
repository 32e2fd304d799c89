//! Candidate scoring.
//!
//! A score is the sum of independent factors clamped to [0, 1]. Every
//! factor that contributes is recorded in the rationale string.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use chrono::NaiveDate;

use super::document::Document;
use super::rules::patterns::{
    AMOUNT_KEYWORD, DATE_KEYWORD, DATE_NEGATIVE, SUBTOTAL_CONTEXT, TAX_KEYWORD,
};
use super::rules::{following_word, line_start, preceding_word, window_before, Candidate};
use crate::models::config::EngineConfig;
use crate::models::receipt::Span;

/// Bytes before an amount searched for a total keyword.
const AMOUNT_KEYWORD_WINDOW: usize = 40;
const AMOUNT_KEYWORD_BONUS: f32 = 0.25;
/// Scale applied when the keyword belongs to a tax or subtotal label.
const DISQUALIFIED_KEYWORD_SCALE: f32 = 0.2;
const SUBTOTAL_WINDOW: usize = 30;
const SUBTOTAL_PENALTY: f32 = 0.4;
const TAX_LINE_PENALTY: f32 = 0.2;
const BLACKLIST_PENALTY: f32 = 0.5;
const MAGNITUDE_PENALTY: f32 = 0.3;

const TAX_KEYWORD_WINDOW: usize = 30;
const TAX_KEYWORD_BONUS: f32 = 0.2;
const SUBTOTAL_KEYWORD_BONUS: f32 = 0.2;

const DATE_KEYWORD_WINDOW: usize = 25;
const DATE_KEYWORD_BONUS: f32 = 0.3;
const DATE_NEGATIVE_PENALTY: f32 = 0.3;
const DATE_GUESS_PENALTY: f32 = 0.2;
const HEADER_DATE_PENALTY: f32 = 0.2;

const TITLE_CASE_BONUS: f32 = 0.05;
const CATEGORY_BONUS: f32 = 0.1;
const CATEGORY_BONUS_CAP: f32 = 0.2;
const PERSON_NAME_PENALTY: f32 = 0.3;
const FORWARDED_PERSON_PENALTY: f32 = 0.6;
const LONG_NAME_PENALTY: f32 = 0.1;
const PROCESSOR_PENALTY: f32 = 0.4;

const CURRENCY_REPEAT_BONUS: f32 = 0.05;
const CURRENCY_REPEAT_CAP: f32 = 0.2;
const CURRENCY_PROXIMITY_BONUS: f32 = 0.15;
const CURRENCY_PROXIMITY_WINDOW: usize = 30;

/// Words before a total keyword that make it a tax or subtotal label.
const DISQUALIFY_BEFORE: &[&str] = &["tax", "taxes", "sub", "gst", "hst", "vat", "pst", "qst"];
/// Words after a total keyword that make it a tax or savings label.
const DISQUALIFY_AFTER: &[&str] = &[
    "tax", "taxes", "gst", "hst", "vat", "pst", "qst", "savings", "saved", "discount", "discounts",
];

lazy_static! {
    static ref MONEY_FRAGMENT: Regex = Regex::new(r"\d[.,]\d{2}\b").unwrap();
}

/// A candidate with its final score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate<T> {
    pub candidate: Candidate<T>,
    pub score: f32,
    pub rationale: String,
}

/// Accumulates named score factors.
#[derive(Debug, Clone, Default)]
pub struct ScoreCard {
    parts: Vec<(&'static str, f32)>,
}

impl ScoreCard {
    pub fn new(priority: u8) -> Self {
        Self {
            parts: vec![("base", base_score(priority))],
        }
    }

    pub fn add(&mut self, factor: &'static str, delta: f32) {
        if delta != 0.0 {
            self.parts.push((factor, delta));
        }
    }

    pub fn total(&self) -> f32 {
        self.parts.iter().map(|(_, d)| d).sum::<f32>().clamp(0.0, 1.0)
    }

    pub fn rationale(&self) -> String {
        let parts: Vec<String> = self
            .parts
            .iter()
            .map(|(name, delta)| match *name {
                "base" => format!("base {:.2}", delta),
                _ => format!("{} {:+.2}", name, delta),
            })
            .collect();
        format!("{} = {:.2}", parts.join(", "), self.total())
    }

    pub fn finish<T>(self, candidate: Candidate<T>) -> ScoredCandidate<T> {
        ScoredCandidate {
            score: self.total(),
            rationale: self.rationale(),
            candidate,
        }
    }
}

/// Base score by tier; tier 1 is highest.
pub fn base_score(priority: u8) -> f32 {
    0.6 / (1.0 + f32::from(priority.max(1)).log10())
}

/// Bonus for the first lines of the body, small penalty further down.
pub fn position_bonus(body_line: usize) -> f32 {
    match body_line {
        0 => 0.20,
        1 => 0.12,
        2 => 0.06,
        n => -(0.02 * (n - 2) as f32).min(0.30),
    }
}

/// Last match of `regex` in the window before `start`, as
/// (absolute start, absolute end, distance to `start`).
fn nearest_before(regex: &Regex, text: &str, start: usize, width: usize) -> Option<(usize, usize, usize)> {
    let window = window_before(text, start, width);
    let offset = start - window.len();
    regex.find_iter(window).last().map(|m| {
        (offset + m.start(), offset + m.end(), window.len() - m.end())
    })
}

/// Whether another money value sits between `from` and `to`.
fn money_between(text: &str, from: usize, to: usize) -> bool {
    text.get(from..to).is_some_and(|between| MONEY_FRAGMENT.is_match(between))
}

/// Keyword proximity bonus for an amount starting at `start`.
pub fn amount_keyword_bonus(text: &str, start: usize) -> f32 {
    let Some((kw_start, kw_end, distance)) =
        nearest_before(&AMOUNT_KEYWORD, text, start, AMOUNT_KEYWORD_WINDOW)
    else {
        return 0.0;
    };
    if money_between(text, kw_end, start) {
        return 0.0;
    }

    let bonus = AMOUNT_KEYWORD_BONUS * (1.0 - distance as f32 / AMOUNT_KEYWORD_WINDOW as f32);
    let disqualified = preceding_word(text, kw_start)
        .is_some_and(|w| DISQUALIFY_BEFORE.contains(&w.as_str()))
        || following_word(text, kw_end).is_some_and(|w| DISQUALIFY_AFTER.contains(&w.as_str()));

    if disqualified {
        bonus * DISQUALIFIED_KEYWORD_SCALE
    } else {
        bonus
    }
}

/// Whether a subtotal label is the nearest label before `start`.
pub fn subtotal_context(text: &str, start: usize) -> bool {
    let Some((_, sub_end, _)) = nearest_before(&SUBTOTAL_CONTEXT, text, start, SUBTOTAL_WINDOW) else {
        return false;
    };
    if money_between(text, sub_end, start) {
        return false;
    }
    match nearest_before(&AMOUNT_KEYWORD, text, start, AMOUNT_KEYWORD_WINDOW) {
        Some((_, kw_end, _)) => sub_end >= kw_end,
        None => true,
    }
}

/// Whether the line holding `start` names a tax before the value.
pub fn on_tax_line(text: &str, start: usize) -> bool {
    TAX_KEYWORD.is_match(&text[line_start(text, start)..start])
}

pub fn score_amounts(
    candidates: Vec<Candidate<Decimal>>,
    document: &Document<'_>,
    config: &EngineConfig,
) -> Vec<ScoredCandidate<Decimal>> {
    let text = document.text();
    let threshold = Decimal::from(config.magnitude_threshold);

    candidates
        .into_iter()
        .map(|candidate| {
            let mut card = ScoreCard::new(candidate.priority);
            if let Some(span) = candidate.span {
                let subtotal = subtotal_context(text, span.start);
                let keyword = if subtotal { 0.0 } else { amount_keyword_bonus(text, span.start) };
                card.add("keyword", keyword);
                if subtotal {
                    card.add("subtotal", -SUBTOTAL_PENALTY);
                }
                if keyword == 0.0 && on_tax_line(text, span.start) {
                    card.add("tax_line", -TAX_LINE_PENALTY);
                }
            }
            if candidate.tags.blacklisted {
                card.add("blacklist", -BLACKLIST_PENALTY);
            }
            if candidate.value > threshold && candidate.priority > 2 {
                card.add("magnitude", -MAGNITUDE_PENALTY);
            }
            card.finish(candidate)
        })
        .collect()
}

pub fn score_subtotals(
    candidates: Vec<Candidate<Decimal>>,
    document: &Document<'_>,
) -> Vec<ScoredCandidate<Decimal>> {
    let text = document.text();
    candidates
        .into_iter()
        .map(|candidate| {
            let mut card = ScoreCard::new(candidate.priority);
            if let Some(span) = candidate.span {
                if let Some((_, _, distance)) =
                    nearest_before(&SUBTOTAL_CONTEXT, text, span.start, SUBTOTAL_WINDOW)
                {
                    card.add(
                        "keyword",
                        SUBTOTAL_KEYWORD_BONUS * (1.0 - distance as f32 / SUBTOTAL_WINDOW as f32),
                    );
                }
            }
            if candidate.tags.blacklisted {
                card.add("blacklist", -BLACKLIST_PENALTY);
            }
            card.finish(candidate)
        })
        .collect()
}

pub fn score_taxes(
    candidates: Vec<Candidate<Decimal>>,
    document: &Document<'_>,
) -> Vec<ScoredCandidate<Decimal>> {
    let text = document.text();
    candidates
        .into_iter()
        .map(|candidate| {
            let mut card = ScoreCard::new(candidate.priority);
            if let Some(span) = candidate.span {
                if let Some((_, _, distance)) =
                    nearest_before(&TAX_KEYWORD, text, span.start, TAX_KEYWORD_WINDOW)
                {
                    card.add(
                        "keyword",
                        TAX_KEYWORD_BONUS * (1.0 - distance as f32 / TAX_KEYWORD_WINDOW as f32),
                    );
                }
            }
            if candidate.tags.blacklisted {
                card.add("blacklist", -BLACKLIST_PENALTY);
            }
            card.finish(candidate)
        })
        .collect()
}

pub fn score_dates(
    candidates: Vec<Candidate<NaiveDate>>,
    document: &Document<'_>,
) -> Vec<ScoredCandidate<NaiveDate>> {
    let text = document.text();
    candidates
        .into_iter()
        .map(|candidate| {
            let mut card = ScoreCard::new(candidate.priority);
            if let Some(line) = candidate.line {
                match document.body_line(line) {
                    Some(body_line) => card.add("position", position_bonus(body_line)),
                    None => card.add("header", -HEADER_DATE_PENALTY),
                }
            }
            if let Some(span) = candidate.span {
                let window = window_before(text, span.start, DATE_KEYWORD_WINDOW);
                if DATE_KEYWORD.is_match(window) {
                    card.add("keyword", DATE_KEYWORD_BONUS);
                }
                if DATE_NEGATIVE.is_match(window) {
                    card.add("not_transaction", -DATE_NEGATIVE_PENALTY);
                }
            }
            if candidate.tags.date_resolution.is_some_and(|r| r.is_guess()) {
                card.add("guessed_order", -DATE_GUESS_PENALTY);
            }
            card.finish(candidate)
        })
        .collect()
}

pub fn score_vendors(
    candidates: Vec<Candidate<String>>,
    document: &Document<'_>,
) -> Vec<ScoredCandidate<String>> {
    candidates
        .into_iter()
        .map(|candidate| {
            let mut card = ScoreCard::new(candidate.priority);
            let tags = &candidate.tags;

            if let Some(body_line) = candidate.line.and_then(|l| document.body_line(l)) {
                card.add("position", position_bonus(body_line));
            }
            if tags.title_case {
                card.add("title_case", TITLE_CASE_BONUS);
            }

            let matched = tags.categories.len() + usize::from(tags.entity_suffix);
            card.add("business", (CATEGORY_BONUS * matched as f32).min(CATEGORY_BONUS_CAP));

            if tags.person_name {
                let penalty = if tags.from_header && document.forwarded() {
                    FORWARDED_PERSON_PENALTY
                } else {
                    PERSON_NAME_PENALTY
                };
                card.add("person_name", -penalty);
            }
            if candidate.value.split_whitespace().count() > 5 {
                card.add("long_name", -LONG_NAME_PENALTY);
            }
            if tags.payment_processor {
                card.add("payment_processor", -PROCESSOR_PENALTY);
            }
            card.finish(candidate)
        })
        .collect()
}

/// Score currencies; needs the span of the selected amount.
pub fn score_currencies(
    candidates: Vec<Candidate<String>>,
    amount_span: Option<Span>,
) -> Vec<ScoredCandidate<String>> {
    let counts: Vec<usize> = candidates
        .iter()
        .map(|c| candidates.iter().filter(|o| o.value == c.value).count())
        .collect();

    candidates
        .into_iter()
        .zip(counts)
        .map(|(candidate, count)| {
            let mut card = ScoreCard::new(candidate.priority);
            card.add(
                "repeats",
                (CURRENCY_REPEAT_BONUS * (count - 1) as f32).min(CURRENCY_REPEAT_CAP),
            );
            if let (Some(span), Some(amount)) = (candidate.span, amount_span) {
                if span.distance(&amount) <= CURRENCY_PROXIMITY_WINDOW {
                    card.add("near_amount", CURRENCY_PROXIMITY_BONUS);
                }
            }
            card.finish(candidate)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::rules::Tags;
    use std::str::FromStr;

    fn money(value: &str, pattern: &str, priority: u8, text: &str, at: &str) -> Candidate<Decimal> {
        let start = text.find(at).unwrap();
        Candidate::new(Decimal::from_str(value).unwrap(), pattern, priority, at)
            .with_span(Span::new(start, start + at.len()))
    }

    #[test]
    fn test_base_score_decreases_with_tier() {
        assert!((base_score(1) - 0.6).abs() < 1e-6);
        assert!(base_score(1) > base_score(2));
        assert!(base_score(2) > base_score(3));
        assert!(base_score(4) > base_score(5));
    }

    #[test]
    fn test_position_bonus() {
        assert_eq!(position_bonus(0), 0.20);
        assert_eq!(position_bonus(2), 0.06);
        assert!((position_bonus(5) + 0.06).abs() < 1e-6);
        assert!((position_bonus(100) + 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_keyword_disqualified_by_tax_prefix() {
        let text = "Total: $6.99\nTax total: $0.33";
        let total = amount_keyword_bonus(text, text.find("6.99").unwrap());
        let tax_total = amount_keyword_bonus(text, text.find("0.33").unwrap());
        assert!(total > 0.2);
        assert!(tax_total < 0.06);
    }

    #[test]
    fn test_keyword_followed_by_tax() {
        let text = "Total Tax: $1.30";
        assert!(amount_keyword_bonus(text, text.find("1.30").unwrap()) < 0.06);
    }

    #[test]
    fn test_keyword_does_not_reach_past_other_amounts() {
        let text = "Total: $14.13\nTrip fare $12.50";
        assert_eq!(amount_keyword_bonus(text, text.find("12.50").unwrap()), 0.0);
        assert!(subtotal_context(text, text.find("12.50").unwrap()));
        assert!(!subtotal_context(text, text.find("14.13").unwrap()));
    }

    #[test]
    fn test_subtotal_scores_below_total() {
        let text = "Subtotal $134.95\nGST $6.75\nPST $12.14\nTOTAL $153.84";
        let document = Document::analyze(text, None);
        let scored = score_amounts(
            vec![
                money("134.95", "currency_symbol", 4, text, "134.95"),
                money("6.75", "currency_symbol", 4, text, "6.75"),
                money("153.84", "total_line_start", 2, text, "153.84"),
            ],
            &document,
            &EngineConfig::default(),
        );
        assert!(scored[2].score > scored[0].score);
        assert!(scored[2].score > scored[1].score);
        assert!(scored[0].rationale.contains("subtotal"));
        assert!(scored[1].rationale.contains("tax_line"));
    }

    #[test]
    fn test_blacklist_and_magnitude() {
        let text = "Coverage up to $50,000.00";
        let document = Document::analyze(text, None);
        let mut candidate = money("50000.00", "currency_symbol", 4, text, "50,000.00");
        candidate.tags = Tags {
            blacklisted: true,
            ..Tags::default()
        };
        let scored = score_amounts(vec![candidate], &document, &EngineConfig::default());
        assert_eq!(scored[0].score, 0.0);
        assert!(scored[0].rationale.contains("blacklist"));
        assert!(scored[0].rationale.contains("magnitude"));
    }

    #[test]
    fn test_vendor_person_name_penalty_amplified_when_forwarded() {
        let text = "---------- Forwarded message ---------\nFrom: Jane Doe <jane@gmail.com>\n\nYour trip with Uber";
        let document = Document::analyze(text, None);
        let mut person = Candidate::new("Jane Doe".to_string(), "from_header", 1, "Jane Doe");
        person.tags = crate::receipt::rules::vendor::tag_vendor("Jane Doe");
        person.tags.from_header = true;
        let scored = score_vendors(vec![person.clone()], &document);
        assert!(scored[0].score <= 0.1, "{}", scored[0].rationale);

        let plain = Document::analyze("Jane Doe\nTotal $5.00", None);
        let scored = score_vendors(vec![person], &plain);
        assert!(scored[0].score > 0.3);
    }

    #[test]
    fn test_currency_proximity_and_repeats() {
        let near = Candidate::new("CAD".to_string(), "iso_code", 1, "CAD").with_span(Span::new(10, 13));
        let far = Candidate::new("USD".to_string(), "iso_code", 1, "USD").with_span(Span::new(200, 203));
        let scored = score_currencies(vec![near, far], Some(Span::new(15, 20)));
        assert!(scored[0].score > scored[1].score);
        assert!(scored[0].rationale.contains("near_amount"));
    }

    #[test]
    fn test_scores_clamped() {
        let mut card = ScoreCard::new(1);
        card.add("bonus", 5.0);
        assert_eq!(card.total(), 1.0);
        let mut card = ScoreCard::new(5);
        card.add("penalty", -5.0);
        assert_eq!(card.total(), 0.0);
        assert!(card.rationale().ends_with("= 0.00"));
    }
}
