//! Error types for the rcpt-core library.
//!
//! Parsing a document never fails; these errors cover building pattern
//! libraries and loading configuration.

use thiserror::Error;

/// Main error type for the rcpt library.
#[derive(Error, Debug)]
pub enum RcptError {
    /// Pattern library construction error.
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while compiling pattern definitions.
#[derive(Error, Debug)]
pub enum PatternError {
    /// The expression failed to compile.
    #[error("pattern {name} failed to compile: {source}")]
    Compile {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// The expression has no `value` capture group.
    #[error("pattern {name} has no `value` capture group")]
    MissingValueGroup { name: String },
}

/// Result type for the rcpt library.
pub type Result<T> = std::result::Result<T, RcptError>;
