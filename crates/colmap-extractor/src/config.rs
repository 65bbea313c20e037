//! Configuration for the extraction pipeline

use colmap_domain::InferenceConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the extraction orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Tables with more rows than this are sampled for discovery
    pub sample_threshold: usize,

    /// Rows shown to the discovery pass when sampling
    pub sample_size: usize,

    /// Estimated-token budget for a single compound extraction prompt
    pub chunk_token_budget: usize,

    /// Maximum time for a single LLM call (seconds)
    pub llm_timeout_secs: u64,

    /// Confidence below which an extraction counts as low-confidence
    pub low_confidence_threshold: f64,

    /// Inference settings for the discovery pass
    pub discovery_inference: InferenceConfig,

    /// Inference settings for compound extraction calls
    pub compound_inference: InferenceConfig,
}

impl ExtractorConfig {
    /// Get the LLM call timeout as a Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_size == 0 {
            return Err("sample_size must be greater than 0".to_string());
        }
        if self.sample_size > self.sample_threshold {
            return Err("sample_size cannot exceed sample_threshold".to_string());
        }
        if self.chunk_token_budget == 0 {
            return Err("chunk_token_budget must be greater than 0".to_string());
        }
        if self.llm_timeout_secs == 0 {
            return Err("llm_timeout_secs must be greater than 0".to_string());
        }
        if !(0.0..=10.0).contains(&self.low_confidence_threshold) {
            return Err("low_confidence_threshold must be within 0-10".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_threshold: 50,
            sample_size: 30,
            chunk_token_budget: 4_000,
            llm_timeout_secs: 300,
            low_confidence_threshold: 5.0,
            discovery_inference: InferenceConfig {
                model: None,
                temperature: Some(0.1),
                max_tokens: Some(4_096),
            },
            compound_inference: InferenceConfig {
                model: None,
                temperature: Some(0.0),
                max_tokens: Some(8_192),
            },
        }
    }
}

impl ExtractorConfig {
    /// Smaller prompts and a short timeout, for small local models
    pub fn compact() -> Self {
        Self {
            sample_size: 15,
            chunk_token_budget: 2_000,
            llm_timeout_secs: 120,
            ..Self::default()
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExtractorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_threshold, 50);
        assert_eq!(config.sample_size, 30);
        assert_eq!(config.chunk_token_budget, 4_000);
    }

    #[test]
    fn test_compact_config_is_valid() {
        assert!(ExtractorConfig::compact().validate().is_ok());
    }

    #[test]
    fn test_invalid_sample_size() {
        let mut config = ExtractorConfig::default();
        config.sample_size = 0;
        assert!(config.validate().is_err());

        config.sample_size = config.sample_threshold + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_budget_and_timeout() {
        let mut config = ExtractorConfig::default();
        config.chunk_token_budget = 0;
        assert!(config.validate().is_err());

        let mut config = ExtractorConfig::default();
        config.llm_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ExtractorConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = ExtractorConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.sample_threshold, parsed.sample_threshold);
        assert_eq!(config.chunk_token_budget, parsed.chunk_token_budget);
        assert_eq!(config.compound_inference, parsed.compound_inference);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = ExtractorConfig::from_toml("chunk_token_budget = 1000").unwrap();
        assert_eq!(parsed.chunk_token_budget, 1000);
        assert_eq!(parsed.sample_size, 30);
    }
}
