//! Error types for the extraction pipeline

use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// LLM provider call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM call exceeded the configured timeout
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// LLM output could not be parsed into the expected structure
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),

    /// The operation was cancelled at a progress checkpoint
    #[error("Extraction cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else that went wrong while assembling the result
    #[error("Extraction failed: {0}")]
    Internal(String),
}

impl ExtractorError {
    /// Whether the failure originated in an LLM call or its output
    pub fn is_llm_failure(&self) -> bool {
        matches!(
            self,
            ExtractorError::Llm(_) | ExtractorError::Timeout(_) | ExtractorError::InvalidResponse(_)
        )
    }

    /// Whether this is the cancellation sentinel
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractorError::Cancelled)
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::InvalidResponse(format!("JSON parse error: {}", e))
    }
}
