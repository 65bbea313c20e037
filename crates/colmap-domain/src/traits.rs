//! Trait definitions for external interactions
//!
//! These traits define the boundaries between the pipeline and its
//! collaborators. Implementations live in other crates.

use crate::{NormalizedData, ParseError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call inference settings; `None` defers to the provider's default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Model identifier override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Output token cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Trait for LLM provider operations
///
/// Implemented by the infrastructure layer (colmap-llm)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Error type for LLM operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run one completion
    async fn infer(&self, prompt: &str, config: &InferenceConfig) -> Result<String, Self::Error>;

    /// Approximate token count of `text` (one token per four characters)
    fn estimate_token_count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    /// Name used in logs and metadata
    fn name(&self) -> &str {
        "llm"
    }
}

/// Options passed to a parser
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    /// Worksheet to read, for formats with sheets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

/// Trait for turning uploaded file bytes into a normalized table
///
/// Parsing is CPU-bound; callers run it on a blocking thread.
pub trait DataParser: Send + Sync {
    /// Parse `bytes` according to the format implied by `filename`
    fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ParseOptions,
    ) -> Result<NormalizedData, ParseError>;

    /// Whether this parser claims `filename`
    fn supports(&self, filename: &str) -> bool;
}
