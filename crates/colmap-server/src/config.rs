//! Configuration file parsing for the server.
//!
//! Loads bind settings, upload limits, the LLM endpoint, and the nested
//! `[extractor]` and `[operations]` tables from TOML.

use colmap_extractor::ExtractorConfig;
use colmap_operations::OperationsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Server configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// LLM backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Ollama API endpoint
    pub endpoint: String,

    /// Model used when a call does not override it
    pub model: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Attempts per call, including the first
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: colmap_llm::ollama::DEFAULT_ENDPOINT.to_string(),
            model: "llama3.1".to_string(),
            request_timeout_secs: 300,
            max_retries: colmap_llm::ollama::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Server configuration loaded from TOML
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1")
    pub bind_address: String,

    /// Bind port (e.g., 8080)
    pub bind_port: u16,

    /// Largest accepted upload, in bytes (default: 25 MiB)
    pub max_upload_bytes: usize,

    /// LLM backend
    pub llm: LlmSettings,

    /// Extraction pipeline settings
    pub extractor: ExtractorConfig,

    /// Operation retention settings
    pub operations: OperationsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 8080,
            max_upload_bytes: 25 * 1024 * 1024,
            llm: LlmSettings::default(),
            extractor: ExtractorConfig::default(),
            operations: OperationsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges, including the nested tables
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be greater than 0".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must not be empty".to_string()));
        }
        self.extractor
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("extractor: {}", e)))?;
        self.operations
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("operations: {}", e)))?;
        Ok(())
    }

    /// Get the full bind address (address:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.bind_port)
    }
}
