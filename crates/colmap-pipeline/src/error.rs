//! Worker errors and their classification into operation error codes

use colmap_domain::{ParseError, Phase};
use colmap_extractor::ExtractorError;
use colmap_operations::{ErrorCode, OperationError, OperationErrorInfo};
use thiserror::Error;

/// Anything that can stop a worker run
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The uploaded file could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The extraction pipeline failed or was cancelled
    #[error(transparent)]
    Extraction(#[from] ExtractorError),

    /// The operation record could not be read or written
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// The worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Task(String),
}

impl WorkerError {
    /// Whether the run stopped because the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Extraction(e) if e.is_cancelled())
    }

    /// Error code reported on the failed operation
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkerError::Parse(e) if e.is_unsupported_format() => ErrorCode::UnsupportedFormat,
            WorkerError::Parse(_) => ErrorCode::ParseError,
            WorkerError::Extraction(e) if e.is_llm_failure() => ErrorCode::LlmError,
            _ => ErrorCode::ExtractionError,
        }
    }

    /// Structured error for the operation record
    ///
    /// `details` carries the debug rendering of the error when requested.
    pub fn to_error_info(&self, phase: Option<Phase>, include_details: bool) -> OperationErrorInfo {
        let info = OperationErrorInfo::new(self.code(), self.to_string()).with_phase(phase);
        if include_details {
            info.with_details(format!("{:?}", self))
        } else {
            info
        }
    }
}
