//! Receipt data models: parse inputs, parse results and provenance.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Optional, read-only context supplied by the caller alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseContext {
    /// Sender address, either bare (`jane@example.com`) or with a display
    /// name (`Jane Doe <jane@example.com>`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,

    /// Subject line of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Sender domain, when the caller already knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_domain: Option<String>,

    /// User-preferred locale such as `en-CA` or `fr_FR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_locale: Option<String>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sender(mut self, address: impl Into<String>) -> Self {
        self.sender_address = Some(address.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_sender_domain(mut self, domain: impl Into<String>) -> Self {
        self.sender_domain = Some(domain.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.user_locale = Some(locale.into());
        self
    }

    /// Region subtag of the locale (`en-CA` -> `CA`).
    pub fn locale_region(&self) -> Option<String> {
        let locale = self.user_locale.as_deref()?.trim();
        let parts: Vec<&str> = locale.split(['-', '_']).collect();

        if parts.len() == 1 {
            let only = parts[0];
            return (only.len() == 2 && only.chars().all(|c| c.is_ascii_uppercase()))
                .then(|| only.to_string());
        }

        parts
            .iter()
            .skip(1)
            .find(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|p| p.to_ascii_uppercase())
    }

    /// Sender domain: the explicit field, else the domain of the address.
    pub fn effective_domain(&self) -> Option<String> {
        if let Some(domain) = self.sender_domain.as_deref() {
            let domain = domain.trim().trim_start_matches('@').to_ascii_lowercase();
            if !domain.is_empty() {
                return Some(domain);
            }
        }

        let address = self.sender_address.as_deref()?;
        let address = match (address.find('<'), address.rfind('>')) {
            (Some(open), Some(close)) if open < close => &address[open + 1..close],
            _ => address,
        };
        let (_, domain) = address.trim().rsplit_once('@')?;
        let domain = domain.trim().to_ascii_lowercase();
        (!domain.is_empty()).then_some(domain)
    }

    /// Display name part of `Name <address>`, if any.
    pub fn sender_display_name(&self) -> Option<String> {
        let address = self.sender_address.as_deref()?;
        let open = address.find('<')?;
        let name = address[..open].trim().trim_matches(['"', '\'']).trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Extracted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Vendor,
    Amount,
    Subtotal,
    Tax,
    Date,
    Currency,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Vendor,
        Field::Amount,
        Field::Subtotal,
        Field::Tax,
        Field::Date,
        Field::Currency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Vendor => "vendor",
            Field::Amount => "amount",
            Field::Subtotal => "subtotal",
            Field::Tax => "tax",
            Field::Date => "date",
            Field::Currency => "currency",
        }
    }

    /// Parse a field name as written on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte offsets `[start, end)` into the parser input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the span lies inside a text of `len` bytes.
    pub fn is_within(&self, len: usize) -> bool {
        self.start <= self.end && self.end <= len
    }

    /// Gap in bytes between two spans (0 when they overlap).
    pub fn distance(&self, other: &Span) -> usize {
        if self.end <= other.start {
            other.start - self.end
        } else if other.end <= self.start {
            self.start - other.end
        } else {
            0
        }
    }
}

/// Component order for purely numeric dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// `MM/DD/YYYY`.
    #[default]
    MonthFirst,
    /// `DD/MM/YYYY`.
    DayFirst,
}

/// How a date's component order was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateResolution {
    /// Textual month, ISO layout, or a component above 12.
    Unambiguous,
    /// The caller's locale hint.
    CallerLocale,
    /// Tax-regime keywords or currency symbols in the document.
    DocumentSignal,
    /// The configured fallback order; a guess.
    ConfiguredDefault,
}

impl DateResolution {
    pub fn is_guess(&self) -> bool {
        matches!(self, DateResolution::ConfiguredDefault)
    }
}

/// Where the reported currency came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CurrencyEvidence {
    /// Selected from document or context evidence.
    Parsed { pattern: String },
    /// Nothing in the document or context identified the currency.
    NoStrongEvidence,
    /// Substituted by the caller after parsing.
    Defaulted { code: String },
}

impl Default for CurrencyEvidence {
    fn default() -> Self {
        Self::NoStrongEvidence
    }
}

/// Non-fatal issues recorded while parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A pattern exceeded its time budget; its matches were discarded.
    PatternTimeout { pattern: String },
    /// The input exceeded the size limit and was cut.
    InputTruncated { limit: usize },
    /// No currency evidence was found.
    CurrencyNoEvidence,
    /// The caller substituted a default currency.
    CurrencyDefaulted { code: String },
    /// A numeric date was resolved with the configured fallback order.
    AmbiguousDate { resolution: DateResolution },
    /// The amount came from a last-resort pattern.
    LowPriorityAmount { pattern: String },
    /// `subtotal + tax` does not match the amount.
    ConsistencyFailed {
        amount: Decimal,
        subtotal: Decimal,
        tax: Decimal,
    },
    /// A field has no candidates.
    MissingField { field: Field },
}

impl Warning {
    /// Whether the warning lowers the aggregate confidence.
    pub fn penalizes(&self) -> bool {
        matches!(
            self,
            Warning::CurrencyDefaulted { .. }
                | Warning::AmbiguousDate { .. }
                | Warning::LowPriorityAmount { .. }
                | Warning::ConsistencyFailed { .. }
        )
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PatternTimeout { pattern } => {
                write!(f, "pattern {} timed out and was skipped", pattern)
            }
            Warning::InputTruncated { limit } => {
                write!(f, "input truncated to {} bytes", limit)
            }
            Warning::CurrencyNoEvidence => f.write_str("currency: no strong evidence"),
            Warning::CurrencyDefaulted { code } => {
                write!(f, "currency defaulted to {} (no strong evidence found)", code)
            }
            Warning::AmbiguousDate { resolution } => {
                write!(f, "ambiguous numeric date resolved by {:?}", resolution)
            }
            Warning::LowPriorityAmount { pattern } => {
                write!(f, "amount matched only by low-priority pattern {}", pattern)
            }
            Warning::ConsistencyFailed {
                amount,
                subtotal,
                tax,
            } => match subtotal.checked_add(*tax) {
                Some(sum) => write!(
                    f,
                    "subtotal {} + tax {} = {} does not match amount {}",
                    subtotal, tax, sum, amount
                ),
                None => write!(
                    f,
                    "subtotal {} + tax {} does not match amount {}",
                    subtotal, tax, amount
                ),
            },
            Warning::MissingField { field } => write!(f, "could not extract {}", field),
        }
    }
}

/// A ranked candidate kept for the review surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub value: String,
    pub score: f32,
    pub pattern: String,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    pub rationale: String,
}

/// Explanation of how one field was decided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    pub confidence: f32,
    pub candidate_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
}

/// Read-only decision record for reviewers and retraining.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub fields: BTreeMap<Field, FieldProvenance>,
    /// Tax lines that were summed into the reported tax.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_lines: Vec<Alternative>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub forwarded: bool,
    pub spacing_repaired: bool,
}

/// Structured record produced by one parse call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub vendor: Option<String>,
    pub amount: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub tax: Option<Decimal>,
    pub currency: Option<String>,
    pub currency_evidence: CurrencyEvidence,
    pub date: Option<NaiveDate>,

    /// Overall confidence (0.0 - 1.0).
    pub confidence: f32,
    pub field_confidence: BTreeMap<Field, f32>,

    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alternatives: BTreeMap<Field, Vec<Alternative>>,
    pub provenance: Provenance,
}

impl ParseResult {
    /// Confidence of one field (0.0 when absent).
    pub fn confidence_of(&self, field: Field) -> f32 {
        self.field_confidence.get(&field).copied().unwrap_or(0.0)
    }

    pub fn consistency_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::ConsistencyFailed { .. }))
    }

    /// Caller-side currency default. The engine itself never defaults.
    pub fn with_default_currency(mut self, code: impl Into<String>) -> Self {
        if self.currency.is_none() {
            let code = code.into().trim().to_ascii_uppercase();
            self.currency = Some(code.clone());
            self.currency_evidence = CurrencyEvidence::Defaulted { code: code.clone() };
            let warning = Warning::CurrencyDefaulted { code };
            self.provenance.warnings.push(warning.to_string());
            self.warnings.push(warning);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_locale_region() {
        assert_eq!(ParseContext::new().with_locale("en-CA").locale_region(), Some("CA".to_string()));
        assert_eq!(ParseContext::new().with_locale("fr_fr").locale_region(), Some("FR".to_string()));
        assert_eq!(ParseContext::new().with_locale("GB").locale_region(), Some("GB".to_string()));
        assert_eq!(ParseContext::new().with_locale("en").locale_region(), None);
    }

    #[test]
    fn test_effective_domain() {
        let ctx = ParseContext::new().with_sender("Uber Receipts <noreply@uber.com>");
        assert_eq!(ctx.effective_domain(), Some("uber.com".to_string()));
        assert_eq!(ctx.sender_display_name(), Some("Uber Receipts".to_string()));

        let ctx = ctx.with_sender_domain("@Receipts.Lyft.com");
        assert_eq!(ctx.effective_domain(), Some("receipts.lyft.com".to_string()));

        let bare = ParseContext::new().with_sender("jane@gmail.com");
        assert_eq!(bare.effective_domain(), Some("gmail.com".to_string()));
        assert_eq!(bare.sender_display_name(), None);
    }

    #[test]
    fn test_span_helpers() {
        let a = Span::new(2, 5);
        let b = Span::new(9, 12);
        assert_eq!(a.distance(&b), 4);
        assert_eq!(b.distance(&a), 4);
        assert!(a.is_within(5));
        assert!(!b.is_within(11));
    }

    #[test]
    fn test_default_currency_is_caller_side() {
        let result = ParseResult::default().with_default_currency("usd");
        assert_eq!(result.currency.as_deref(), Some("USD"));
        assert_eq!(
            result.currency_evidence,
            CurrencyEvidence::Defaulted { code: "USD".to_string() }
        );
        assert!(result.warnings.iter().any(|w| w.penalizes()));

        let untouched = ParseResult {
            currency: Some("EUR".to_string()),
            ..ParseResult::default()
        }
        .with_default_currency("USD");
        assert_eq!(untouched.currency.as_deref(), Some("EUR"));
        assert!(untouched.warnings.is_empty());
    }

    #[test]
    fn test_consistency_warning_display() {
        let warning = Warning::ConsistencyFailed {
            amount: Decimal::new(1000, 2),
            subtotal: Decimal::new(900, 2),
            tax: Decimal::new(50, 2),
        };
        assert_eq!(warning.to_string(), "subtotal 9.00 + tax 0.50 = 9.50 does not match amount 10.00");

        let huge = Warning::ConsistencyFailed {
            amount: Decimal::ONE,
            subtotal: Decimal::MAX,
            tax: Decimal::MAX,
        };
        assert!(huge.to_string().ends_with("does not match amount 1"));
    }

    #[test]
    fn test_currency_warnings() {
        assert!(!Warning::CurrencyNoEvidence.penalizes());
        assert!(Warning::CurrencyDefaulted { code: "USD".to_string() }.penalizes());
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Field::from_name("Amount"), Some(Field::Amount));
        assert_eq!(Field::from_name("nope"), None);
        assert_eq!(Field::Tax.to_string(), "tax");
    }
}
