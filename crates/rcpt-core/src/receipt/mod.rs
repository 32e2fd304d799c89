//! Receipt field extraction.
//!
//! Control flow is one-directional: normalize, generate candidates with
//! every rule, score, select, validate, aggregate and record provenance.

pub mod confidence;
pub mod document;
pub mod normalize;
mod parser;
pub mod provenance;
pub mod rules;
pub mod scoring;
pub mod select;
pub mod validate;

pub use document::{Document, Region};
pub use normalize::{normalize, normalize_with_report, Normalized};
pub use parser::{ReceiptEngine, ReceiptParser};
pub use rules::{PatternDef, PatternFlags, PatternLibrary, PatternSpec};
