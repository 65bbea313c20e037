//! Operations manager: the sanctioned way to mutate operations

use crate::error::OperationError;
use crate::operation::{ExtractionRequest, Operation, OperationErrorInfo, OperationPatch, OperationStatus};
use crate::store::OperationStore;
use chrono::Utc;
use colmap_domain::{ExtractionResult, Progress, ProgressUpdate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Creates, reads and transitions operations on top of an [`OperationStore`]
///
/// Only [`cancel`](Self::cancel) validates its source status. The other
/// transitions are driven by the worker's own control flow.
#[derive(Debug, Clone)]
pub struct OperationsManager {
    store: Arc<OperationStore>,
}

impl OperationsManager {
    /// Create a manager over `store`
    pub fn new(store: Arc<OperationStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<OperationStore> {
        &self.store
    }

    /// Create a pending operation for `request`
    pub fn create(&self, request: ExtractionRequest) -> Operation {
        let id = Uuid::now_v7().to_string();
        let operation = Operation::new(id, request);
        self.store.create(operation.clone());

        info!(
            "Created operation {} for '{}'",
            operation.id, operation.request.filename
        );
        operation
    }

    /// Get an operation, failing if it does not exist
    pub fn get(&self, id: &str) -> Result<Operation, OperationError> {
        self.store
            .get(id)
            .ok_or_else(|| OperationError::NotFound(id.to_string()))
    }

    /// Whether an operation exists
    pub fn exists(&self, id: &str) -> bool {
        self.store.has(id)
    }

    fn update(&self, id: &str, patch: OperationPatch) -> Result<Operation, OperationError> {
        self.store
            .update(id, patch)
            .ok_or_else(|| OperationError::NotFound(id.to_string()))
    }

    /// Set the status and stamp the matching timestamp
    pub fn update_status(&self, id: &str, status: OperationStatus) -> Result<Operation, OperationError> {
        let operation = self.update(id, OperationPatch::status(status, Utc::now()))?;
        info!("Operation {} is now {}", id, status);
        Ok(operation)
    }

    /// Merge a partial progress update into the stored progress
    ///
    /// Fields missing from `update` keep their previous value; an
    /// operation without progress starts from [`Progress::default`].
    pub fn update_progress(&self, id: &str, update: &ProgressUpdate) -> Result<Operation, OperationError> {
        let current = self.get(id)?;
        let merged = current.progress.unwrap_or_default().merge(update);

        debug!(
            "Operation {} progress: {} {}%",
            id, merged.phase, merged.percent_complete
        );
        self.update(id, OperationPatch::progress(merged))
    }

    /// Mark completed with `result`, forcing progress to 100%
    pub fn complete(&self, id: &str, result: ExtractionResult) -> Result<Operation, OperationError> {
        let current = self.get(id)?;
        let progress = current
            .progress
            .as_ref()
            .map(Progress::finished)
            .unwrap_or_else(|| Progress::default().finished());

        let mut patch = OperationPatch::status(OperationStatus::Completed, Utc::now());
        patch.progress = Some(progress);
        patch.result = Some(result);

        let operation = self.update(id, patch)?;
        info!("Operation {} completed", id);
        Ok(operation)
    }

    /// Mark failed; a bare message becomes an `EXTRACTION_ERROR`
    pub fn fail(&self, id: &str, error: impl Into<OperationErrorInfo>) -> Result<Operation, OperationError> {
        let error = error.into();
        warn!("Operation {} failed: {:?} {}", id, error.code, error.message);

        let mut patch = OperationPatch::status(OperationStatus::Failed, Utc::now());
        patch.error = Some(error);
        self.update(id, patch)
    }

    /// Cancel a pending or processing operation
    ///
    /// Sets the status to cancelled and triggers the operation's
    /// cancellation token. Any other status is refused and left unchanged.
    pub fn cancel(&self, id: &str) -> Result<Operation, OperationError> {
        let current = self.get(id)?;
        if !current.status.is_cancellable() {
            return Err(OperationError::NotCancellable {
                id: id.to_string(),
                status: current.status,
            });
        }

        let operation = self.update(id, OperationPatch::status(OperationStatus::Cancelled, Utc::now()))?;
        operation.cancel_token.cancel();

        info!("Operation {} cancelled", id);
        Ok(operation)
    }

    /// Put a cancelled operation back into the cancelled status
    ///
    /// Used when a later write overwrote a concurrent cancel. The first
    /// `cancelled_at` is kept; it is only stamped if missing.
    pub fn restore_cancelled(&self, id: &str) -> Result<Operation, OperationError> {
        let current = self.get(id)?;
        let patch = OperationPatch {
            status: Some(OperationStatus::Cancelled),
            cancelled_at: current.cancelled_at.is_none().then(Utc::now),
            ..Default::default()
        };

        let operation = self.update(id, patch)?;
        debug!("Operation {} restored to cancelled", id);
        Ok(operation)
    }

    /// Whether the operation exists and is pending or processing
    pub fn can_cancel(&self, id: &str) -> bool {
        self.store
            .get(id)
            .is_some_and(|op| op.status.is_cancellable())
    }

    /// Remove an operation, stopping its worker at the next checkpoint
    pub fn delete(&self, id: &str) -> Result<(), OperationError> {
        let operation = self.get(id)?;
        operation.cancel_token.cancel();

        if !self.store.delete(id) {
            return Err(OperationError::NotFound(id.to_string()));
        }
        info!("Operation {} deleted", id);
        Ok(())
    }

    /// Every operation, newest first
    pub fn list(&self) -> Vec<Operation> {
        let mut operations = self.store.get_all();
        operations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        operations
    }

    /// Cancellation token shared with the operation's worker
    pub fn cancellation_token(&self, id: &str) -> Result<CancellationToken, OperationError> {
        Ok(self.get(id)?.cancel_token)
    }

    /// Operation count per status
    pub fn status_counts(&self) -> BTreeMap<OperationStatus, usize> {
        self.store.count_by_status()
    }

    /// Evict expired operations now; returns how many were removed
    pub fn cleanup(&self) -> usize {
        self.store.cleanup_expired()
    }
}
