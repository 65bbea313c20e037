//! The asynchronous operation record and its read model

use chrono::{DateTime, Utc};
use colmap_domain::{ExtractionContext, ExtractionResult, Phase, Progress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of an operation
///
/// `Pending → Processing → Completed | Failed`, and `Pending | Processing →
/// Cancelled`. The three end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Created, worker not started yet
    Pending,
    /// Worker is running
    Processing,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl OperationStatus {
    /// Every status, in lifecycle order
    pub const ALL: [OperationStatus; 5] = [
        OperationStatus::Pending,
        OperationStatus::Processing,
        OperationStatus::Completed,
        OperationStatus::Failed,
        OperationStatus::Cancelled,
    ];

    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    /// Whether a cancel request is legal from this status
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::Processing)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure category surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The file or sheet could not be parsed
    ParseError,
    /// No parser handles the file type
    UnsupportedFormat,
    /// An inference call failed or returned unusable output
    LlmError,
    /// Anything else
    ExtractionError,
}

/// Structured error stored on a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationErrorInfo {
    /// Failure category
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Phase the pipeline was in when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Debug detail, only populated outside production
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl OperationErrorInfo {
    /// Create an error with no phase or details
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            phase: None,
            details: None,
        }
    }

    /// Attach the failing phase
    pub fn with_phase(mut self, phase: Option<Phase>) -> Self {
        self.phase = phase;
        self
    }

    /// Attach debug details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<String> for OperationErrorInfo {
    /// A bare message is an uncategorized extraction error
    fn from(message: String) -> Self {
        Self::new(ErrorCode::ExtractionError, message)
    }
}

impl From<&str> for OperationErrorInfo {
    fn from(message: &str) -> Self {
        Self::from(message.to_string())
    }
}

/// Input the worker needs to run an extraction
#[derive(Clone)]
pub struct ExtractionRequest {
    /// Raw uploaded file
    pub file: Vec<u8>,
    /// Uploaded filename; its extension selects the parser
    pub filename: String,
    /// Worksheet to read, for formats that have sheets
    pub sheet_name: Option<String>,
    /// Target schema
    pub context: ExtractionContext,
}

impl fmt::Debug for ExtractionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionRequest")
            .field("file", &format_args!("<{} bytes>", self.file.len()))
            .field("filename", &self.filename)
            .field("sheet_name", &self.sheet_name)
            .field("context", &self.context)
            .finish()
    }
}

/// One asynchronous extraction job
///
/// Records are owned by the [`OperationStore`](crate::OperationStore); the
/// copies handed out by the store share the request payload and the
/// cancellation token with the stored record.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Unique, immutable identifier
    pub id: String,
    /// Current lifecycle state
    pub status: OperationStatus,
    /// When the operation was created
    pub created_at: DateTime<Utc>,
    /// When processing started
    pub started_at: Option<DateTime<Utc>>,
    /// When the operation completed
    pub completed_at: Option<DateTime<Utc>>,
    /// When the operation failed
    pub failed_at: Option<DateTime<Utc>>,
    /// When the operation was cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Latest progress, once processing began
    pub progress: Option<Progress>,
    /// Present only when completed
    pub result: Option<ExtractionResult>,
    /// Present only when failed
    pub error: Option<OperationErrorInfo>,
    /// Payload for the worker
    pub request: Arc<ExtractionRequest>,
    /// Signalled when the operation is cancelled or deleted
    pub cancel_token: CancellationToken,
}

impl Operation {
    /// New pending operation created now
    pub fn new(id: impl Into<String>, request: ExtractionRequest) -> Self {
        Self::new_at(id, request, Utc::now())
    }

    /// New pending operation with an explicit creation time
    pub fn new_at(id: impl Into<String>, request: ExtractionRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status: OperationStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            progress: None,
            result: None,
            error: None,
            request: Arc::new(request),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Phase of the last recorded progress
    pub fn phase(&self) -> Option<Phase> {
        self.progress.as_ref().map(|p| p.phase)
    }

    /// Client-facing view of this operation
    pub fn view(&self) -> OperationView {
        OperationView::from(self)
    }
}

/// Shallow update applied by [`OperationStore::update`](crate::OperationStore::update)
///
/// Only fields set to `Some` are written; nested values such as `progress`
/// replace the stored value wholesale.
#[derive(Debug, Clone, Default)]
pub struct OperationPatch {
    /// New status
    pub status: Option<OperationStatus>,
    /// Processing start time
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure time
    pub failed_at: Option<DateTime<Utc>>,
    /// Cancellation time
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Full progress snapshot
    pub progress: Option<Progress>,
    /// Extraction result
    pub result: Option<ExtractionResult>,
    /// Failure details
    pub error: Option<OperationErrorInfo>,
}

impl OperationPatch {
    /// Patch that sets the status and stamps its timestamp with `at`
    pub fn status(status: OperationStatus, at: DateTime<Utc>) -> Self {
        let mut patch = Self {
            status: Some(status),
            ..Default::default()
        };
        match status {
            OperationStatus::Pending => {}
            OperationStatus::Processing => patch.started_at = Some(at),
            OperationStatus::Completed => patch.completed_at = Some(at),
            OperationStatus::Failed => patch.failed_at = Some(at),
            OperationStatus::Cancelled => patch.cancelled_at = Some(at),
        }
        patch
    }

    /// Patch that replaces the progress snapshot
    pub fn progress(progress: Progress) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Write the set fields into `op`
    pub fn apply_to(self, op: &mut Operation) {
        if let Some(status) = self.status {
            op.status = status;
        }
        if let Some(at) = self.started_at {
            op.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            op.completed_at = Some(at);
        }
        if let Some(at) = self.failed_at {
            op.failed_at = Some(at);
        }
        if let Some(at) = self.cancelled_at {
            op.cancelled_at = Some(at);
        }
        if let Some(progress) = self.progress {
            op.progress = Some(progress);
        }
        if let Some(result) = self.result {
            op.result = Some(result);
        }
        if let Some(error) = self.error {
            op.error = Some(error);
        }
    }
}

/// Read model returned to polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationView {
    /// Operation identifier
    pub operation_id: String,
    /// Current status
    pub status: OperationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Processing start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Cancellation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Latest progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Result, when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionResult>,
    /// Error, when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationErrorInfo>,
}

impl From<&Operation> for OperationView {
    fn from(op: &Operation) -> Self {
        let completed = op.status == OperationStatus::Completed;
        let failed = op.status == OperationStatus::Failed;
        Self {
            operation_id: op.id.clone(),
            status: op.status,
            created_at: op.created_at,
            started_at: op.started_at,
            completed_at: op.completed_at,
            failed_at: op.failed_at,
            cancelled_at: op.cancelled_at,
            progress: op.progress.clone(),
            result: op.result.clone().filter(|_| completed),
            error: op.error.clone().filter(|_| failed),
        }
    }
}
