//! Per-field winner selection.

use std::cmp::Ordering;

use super::scoring::ScoredCandidate;
use crate::models::receipt::Alternative;

/// Weight of the winning score in the selection confidence.
const SCORE_WEIGHT: f32 = 0.7;
/// Weight of the margin over the runner-up.
const MARGIN_WEIGHT: f32 = 0.3;
/// Margin treated as a decisive win.
const DECISIVE_MARGIN: f32 = 0.25;

/// Outcome of selecting one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection<T> {
    pub winner: Option<ScoredCandidate<T>>,
    pub confidence: f32,
    /// Best candidates with distinct values, winner first.
    pub alternatives: Vec<Alternative>,
    pub candidate_count: usize,
}

impl<T> Selection<T> {
    pub fn empty() -> Self {
        Self {
            winner: None,
            confidence: 0.0,
            alternatives: Vec::new(),
            candidate_count: 0,
        }
    }

    pub fn value(&self) -> Option<&T> {
        self.winner.as_ref().map(|w| &w.candidate.value)
    }

    pub fn pattern(&self) -> Option<&str> {
        self.winner.as_ref().map(|w| w.candidate.pattern.as_str())
    }

    pub fn priority(&self) -> Option<u8> {
        self.winner.as_ref().map(|w| w.candidate.priority)
    }
}

/// Total order: score descending, then tier, then position, then rule name.
fn compare<T>(a: &ScoredCandidate<T>, b: &ScoredCandidate<T>) -> Ordering {
    let position = |c: &ScoredCandidate<T>| c.candidate.span.map(|s| s.start).unwrap_or(usize::MAX);
    b.score
        .total_cmp(&a.score)
        .then(a.candidate.priority.cmp(&b.candidate.priority))
        .then(position(a).cmp(&position(b)))
        .then_with(|| a.candidate.pattern.cmp(&b.candidate.pattern))
}

/// Sort candidates best first.
pub fn rank<T>(scored: &mut [ScoredCandidate<T>]) {
    scored.sort_by(compare);
}

/// Confidence from the winning score and its margin over the runner-up.
pub fn selection_confidence(score: f32, runner_up: Option<f32>) -> f32 {
    let margin = score - runner_up.unwrap_or(0.0);
    let margin_part = (margin / DECISIVE_MARGIN).clamp(0.0, 1.0);
    (SCORE_WEIGHT * score + MARGIN_WEIGHT * margin_part).clamp(0.0, 1.0)
}

pub fn to_alternative<T>(scored: &ScoredCandidate<T>) -> Alternative {
    let candidate = &scored.candidate;
    Alternative {
        value: candidate.normalized.clone(),
        score: scored.score,
        pattern: candidate.pattern.clone(),
        priority: candidate.priority,
        span: candidate.span,
        rationale: scored.rationale.clone(),
    }
}

/// Pick the best candidate; the runner-up is the best one with a different value.
pub fn select<T: PartialEq>(mut scored: Vec<ScoredCandidate<T>>, max_alternatives: usize) -> Selection<T> {
    if scored.is_empty() {
        return Selection::empty();
    }
    rank(&mut scored);

    let candidate_count = scored.len();
    let mut distinct: Vec<&ScoredCandidate<T>> = Vec::new();
    for candidate in &scored {
        if !distinct.iter().any(|d| d.candidate.value == candidate.candidate.value) {
            distinct.push(candidate);
        }
    }

    let runner_up = distinct.get(1).map(|c| c.score);
    let alternatives = distinct
        .iter()
        .take(max_alternatives)
        .map(|c| to_alternative(c))
        .collect();

    let winner = scored.swap_remove(0);
    Selection {
        confidence: selection_confidence(winner.score, runner_up),
        winner: Some(winner),
        alternatives,
        candidate_count,
    }
}
