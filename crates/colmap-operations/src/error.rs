//! Error types for operation management

use crate::operation::OperationStatus;
use thiserror::Error;

/// Errors raised to callers of the operations API
///
/// These never end up on an operation record; they describe why a request
/// against an operation was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// No operation with this id (never created, deleted, or swept)
    #[error("Operation not found: {0}")]
    NotFound(String),

    /// Cancel requested from a status that does not allow it
    #[error("Cannot cancel operation {id}: status is {status}")]
    NotCancellable {
        /// Operation id
        id: String,
        /// Status at the time of the request
        status: OperationStatus,
    },
}

impl OperationError {
    /// Whether the operation was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperationError::NotFound(_))
    }
}
