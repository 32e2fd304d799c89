//! Rule-based candidate generators for receipt fields.

pub mod amounts;
pub mod currency;
pub mod dates;
pub mod patterns;
pub mod tax;
pub mod vendor;

use std::time::{Duration, Instant};

use tracing::warn;

use crate::models::receipt::{DateResolution, Span};

pub use amounts::{format_money, parse_money};
pub use dates::parse_textual_date;
pub use patterns::{PatternDef, PatternFlags, PatternLibrary, PatternSpec};
pub use vendor::BusinessCategory;

/// Structural tags attached to a candidate by its generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    /// A disallowed phrase precedes the match.
    pub blacklisted: bool,
    pub entity_suffix: bool,
    pub categories: Vec<BusinessCategory>,
    pub person_name: bool,
    pub title_case: bool,
    pub payment_processor: bool,
    /// Derived from an email `From:` header.
    pub from_header: bool,
    /// A tax line restating already itemized taxes.
    pub restatement: bool,
    pub date_resolution: Option<DateResolution>,
}

/// One plausible value for a field.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<T> {
    pub value: T,
    pub pattern: String,
    pub priority: u8,
    /// Span in the normalized text; `None` for values derived from the
    /// parse context.
    pub span: Option<Span>,
    /// Text the rule matched.
    pub raw: String,
    /// Matched value after cleanup.
    pub normalized: String,
    /// Line index in the normalized text.
    pub line: Option<usize>,
    pub tags: Tags,
}

impl<T> Candidate<T> {
    pub fn new(value: T, pattern: &str, priority: u8, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            value,
            pattern: pattern.to_string(),
            priority,
            span: None,
            normalized: raw.clone(),
            raw,
            line: None,
            tags: Tags::default(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_normalized(mut self, normalized: impl Into<String>) -> Self {
        self.normalized = normalized.into();
        self
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

/// A rule match with the `value` group located.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'t> {
    /// Whole match.
    pub whole: Span,
    /// The `value` group.
    pub span: Span,
    pub value: &'t str,
    pub raw: &'t str,
}

/// Runs rules over one document under a per-rule time budget.
pub struct Scanner<'t> {
    text: &'t str,
    budget: Duration,
    timed_out: Vec<String>,
}

impl<'t> Scanner<'t> {
    pub fn new(text: &'t str, budget: Duration) -> Self {
        Self {
            text,
            budget,
            timed_out: Vec::new(),
        }
    }

    pub fn text(&self) -> &'t str {
        self.text
    }

    /// All matches of a rule. A rule that exceeds its budget yields nothing
    /// and is recorded as timed out.
    pub fn matches(&mut self, spec: &PatternSpec) -> Vec<RuleMatch<'t>> {
        let text = self.text;
        let started = Instant::now();
        let mut found = Vec::new();

        for caps in spec.regex().captures_iter(text) {
            if started.elapsed() >= self.budget {
                return self.time_out(spec);
            }

            let (Some(whole), Some(value)) = (caps.get(0), caps.name("value")) else {
                continue;
            };

            if let Some(word) = preceding_word(text, whole.start()) {
                if spec.excluded_by(&word) {
                    continue;
                }
            }

            found.push(RuleMatch {
                whole: Span::new(whole.start(), whole.end()),
                span: Span::new(value.start(), value.end()),
                value: value.as_str(),
                raw: whole.as_str(),
            });
        }

        if started.elapsed() >= self.budget {
            return self.time_out(spec);
        }

        found
    }

    fn time_out(&mut self, spec: &PatternSpec) -> Vec<RuleMatch<'t>> {
        warn!(pattern = spec.name(), budget_ms = self.budget.as_millis() as u64, "pattern timed out");
        self.timed_out.push(spec.name().to_string());
        Vec::new()
    }

    /// Names of rules that ran out of time, in evaluation order.
    pub fn timed_out(&self) -> &[String] {
        &self.timed_out
    }
}

/// Largest char boundary not above `index`.
pub(crate) fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Up to `width` bytes of text ending at `end`.
pub(crate) fn window_before(text: &str, end: usize, width: usize) -> &str {
    let end = floor_char_boundary(text, end);
    let start = floor_char_boundary(text, end.saturating_sub(width));
    &text[start..end]
}

/// Up to `width` bytes of text starting at `start`.
pub(crate) fn window_after(text: &str, start: usize, width: usize) -> &str {
    let start = floor_char_boundary(text, start);
    let end = floor_char_boundary(text, start.saturating_add(width));
    &text[start..end]
}

/// Start of the line containing `offset`.
pub(crate) fn line_start(text: &str, offset: usize) -> usize {
    let offset = floor_char_boundary(text, offset);
    text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// The word directly before `offset` on the same line, lowercased.
pub(crate) fn preceding_word(text: &str, offset: usize) -> Option<String> {
    let offset = floor_char_boundary(text, offset);
    let before = &text[line_start(text, offset)..offset];
    let trimmed = before.trim_end_matches([' ', '\t', '.', '-', ':', '|', '*', '(', '/']);
    let word: String = trimmed
        .chars()
        .rev()
        .take_while(|c| c.is_alphabetic())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (!word.is_empty()).then(|| word.to_lowercase())
}

/// The word directly after `offset` on the same line, lowercased.
pub(crate) fn following_word(text: &str, offset: usize) -> Option<String> {
    let after = window_after(text, offset, 40);
    let after = after.split('\n').next().unwrap_or("");
    let word: String = after
        .trim_start_matches([' ', '\t', '-'])
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    (!word.is_empty()).then(|| word.to_lowercase())
}

/// Whether a disallowed phrase appears in the 100 bytes before `start`.
pub(crate) fn blacklisted(text: &str, start: usize) -> bool {
    patterns::BLACKLIST_CONTEXT.is_match(window_before(text, start, 100))
}

/// Whether a disallowed phrase appears earlier on the line of `start`.
/// Headers on previous lines do not count.
pub(crate) fn blacklisted_on_line(text: &str, start: usize) -> bool {
    let start = floor_char_boundary(text, start);
    patterns::BLACKLIST_CONTEXT.is_match(&text[line_start(text, start)..start])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::receipt::Field;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preceding_word() {
        let text = "Sub-total: $5.00\nGST/TPS $0.25";
        assert_eq!(preceding_word(text, text.find("total").unwrap()), Some("sub".to_string()));
        assert_eq!(preceding_word(text, text.find("GST").unwrap()), None);
        assert_eq!(preceding_word(text, text.find("TPS").unwrap()), Some("gst".to_string()));
    }

    #[test]
    fn test_following_word() {
        let text = "Total Tax: $0.33\nnext";
        assert_eq!(following_word(text, 5), Some("tax".to_string()));
        assert_eq!(following_word(text, 16), None);
    }

    #[test]
    fn test_windows_respect_char_boundaries() {
        let text = "€€€€ Total €5.00";
        for i in 0..=text.len() {
            let _ = window_before(text, i, 3);
            let _ = window_after(text, i, 3);
            let _ = preceding_word(text, i);
        }
        assert_eq!(floor_char_boundary(text, 1), 0);
    }

    #[test]
    fn test_scanner_excludes_preceding_words() {
        let library = PatternLibrary::standard().unwrap();
        let spec = library.get("generic_total").unwrap();
        let text = "Sub Total $10.00\nTotal $12.00";
        let mut scanner = Scanner::new(text, Duration::from_secs(5));
        let values: Vec<&str> = scanner.matches(spec).iter().map(|m| m.value).collect();
        assert_eq!(values, vec!["12.00"]);
    }

    #[test]
    fn test_scanner_timeout_records_pattern() {
        let library = PatternLibrary::standard().unwrap();
        let spec = library.for_field(Field::Amount).next().unwrap();
        let mut scanner = Scanner::new("Amount paid: $5.00", Duration::ZERO);
        assert!(scanner.matches(spec).is_empty());
        assert_eq!(scanner.timed_out(), &[spec.name().to_string()]);
    }

    #[test]
    fn test_blacklisted_window() {
        let text = "Insurance limit up to $50,000.00";
        assert!(blacklisted(text, text.find("50").unwrap()));
        assert!(!blacklisted("Total $5.00", 7));
    }
}
