//! Data models for receipt extraction.

pub mod config;
pub mod receipt;

pub use config::{EngineConfig, OutputConfig, RcptConfig};
pub use receipt::*;
