//! Configuration structures for the extraction engine and its callers.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RcptError, Result};
use crate::models::receipt::DateOrder;

/// Main configuration for rcpt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcptConfig {
    /// Extraction engine configuration.
    pub engine: EngineConfig,

    /// Caller-side output policy.
    pub output: OutputConfig,
}

/// Extraction engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overall confidence below which a result needs review (0.0 - 1.0).
    pub review_threshold: f32,

    /// Time budget for a single pattern over one document, in milliseconds.
    pub pattern_timeout_ms: u64,

    /// Longer inputs are truncated.
    pub max_input_bytes: usize,

    /// Fallback order for numeric dates with no other signal.
    pub default_date_order: DateOrder,

    /// Amounts above this from low-priority patterns are penalized.
    pub magnitude_threshold: u64,

    /// Relative tolerance of the subtotal + tax = amount check, in percent.
    pub consistency_tolerance_pct: f32,

    /// Absolute floor of the consistency tolerance.
    pub consistency_tolerance_floor: f32,

    /// Alternatives retained per field.
    pub max_alternatives: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.70,
            pattern_timeout_ms: 50,
            max_input_bytes: 256 * 1024,
            default_date_order: DateOrder::MonthFirst,
            magnitude_threshold: 10_000,
            consistency_tolerance_pct: 1.0,
            consistency_tolerance_floor: 0.05,
            max_alternatives: 3,
        }
    }
}

/// Output policy applied by the calling application, never by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Currency substituted when the document gives no evidence.
    pub default_currency: Option<String>,

    /// Include provenance in output.
    pub explain: bool,
}

impl RcptConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if !(0.0..=1.0).contains(&engine.review_threshold) {
            return Err(RcptError::Config(format!(
                "review_threshold must be within 0.0 - 1.0, got {}",
                engine.review_threshold
            )));
        }
        if engine.consistency_tolerance_pct < 0.0 || engine.consistency_tolerance_floor < 0.0 {
            return Err(RcptError::Config(
                "consistency tolerances must not be negative".to_string(),
            ));
        }
        if engine.max_input_bytes == 0 {
            return Err(RcptError::Config("max_input_bytes must be positive".to_string()));
        }
        if let Some(code) = &self.output.default_currency {
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(RcptError::Config(format!(
                    "default_currency must be a 3-letter ISO code, got {:?}",
                    code
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RcptConfig::default();
        assert_eq!(config.engine.review_threshold, 0.70);
        assert_eq!(config.engine.default_date_order, DateOrder::MonthFirst);
        assert_eq!(config.engine.max_alternatives, 3);
        assert_eq!(config.output.default_currency, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RcptConfig =
            serde_json::from_str(r#"{"engine": {"default_date_order": "day_first"}}"#).unwrap();
        assert_eq!(config.engine.default_date_order, DateOrder::DayFirst);
        assert_eq!(config.engine.pattern_timeout_ms, 50);
        assert!(!config.output.explain);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = RcptConfig::default();
        config.output.default_currency = Some("CAD".to_string());
        config.engine.pattern_timeout_ms = 10;
        config.save(&path).unwrap();

        let loaded = RcptConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = RcptConfig::default();
        config.engine.review_threshold = 1.5;
        assert!(matches!(config.validate(), Err(RcptError::Config(_))));

        let mut config = RcptConfig::default();
        config.output.default_currency = Some("dollars".to_string());
        assert!(config.validate().is_err());
    }
}
