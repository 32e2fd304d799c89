//! Core library for receipt field extraction.
//!
//! This crate provides:
//! - Text normalization for OCR output and email bodies
//! - A declarative pattern library with priority tiers
//! - Candidate scoring, selection and field validation
//! - Confidence aggregation, the review gate and provenance

pub mod error;
pub mod models;
pub mod receipt;

pub use error::{PatternError, RcptError, Result};
pub use models::config::{EngineConfig, OutputConfig, RcptConfig};
pub use models::receipt::{
    Alternative, CurrencyEvidence, DateOrder, DateResolution, Field, FieldProvenance, ParseContext,
    ParseResult, Provenance, Span, Warning,
};
pub use receipt::{normalize, PatternLibrary, ReceiptEngine, ReceiptParser};

/// Parse receipt text with the default engine.
pub fn parse(text: &str, context: Option<&ParseContext>) -> ParseResult {
    ReceiptEngine::default().parse(text, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand() {
        let context = ParseContext::new().with_locale("en-CA");
        let result = parse("Tim Hortons\nTotal: $4.25", Some(&context));
        assert_eq!(result.amount, Some(rust_decimal::Decimal::new(425, 2)));
        assert_eq!(result.currency.as_deref(), Some("CAD"));
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ReceiptEngine>();
    }
}
