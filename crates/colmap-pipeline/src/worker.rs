//! Extraction worker: drives one operation from pending to a terminal status

use crate::error::WorkerError;
use colmap_domain::{DataParser, LlmProvider, NormalizedData, ParseOptions, Phase, ProgressUpdate};
use colmap_extractor::{ExtractionOrchestrator, ExtractorError};
use colmap_operations::{ErrorCode, Operation, OperationStatus, OperationsManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// How a worker run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Result stored, operation completed
    Completed,
    /// Operation marked failed with this code
    Failed(ErrorCode),
    /// Operation was cancelled; nothing written after the cancel
    Cancelled,
    /// Operation disappeared (deleted or swept) while the worker ran
    Vanished,
    /// Operation was already past pending when the worker picked it up
    NotPending(OperationStatus),
}

/// Runs parsing and extraction for operations and records the outcome
///
/// All writes go through the [`OperationsManager`]. Cancellation is
/// observed at checkpoints: before starting, right after entering
/// processing, after parsing, on every progress report from the
/// orchestrator, and once more before storing the result.
pub struct ExtractionWorker<L, P>
where
    L: LlmProvider,
    P: DataParser,
{
    manager: OperationsManager,
    orchestrator: ExtractionOrchestrator<L>,
    parser: Arc<P>,
    include_error_details: bool,
}

impl<L, P> ExtractionWorker<L, P>
where
    L: LlmProvider + 'static,
    P: DataParser + 'static,
{
    /// Create a worker
    ///
    /// Whether failure details are recorded follows the store's
    /// [`OperationsConfig`](colmap_operations::OperationsConfig).
    pub fn new(manager: OperationsManager, orchestrator: ExtractionOrchestrator<L>, parser: P) -> Self {
        let include_error_details = manager.store().config().include_error_details;
        Self {
            manager,
            orchestrator,
            parser: Arc::new(parser),
            include_error_details,
        }
    }

    /// Manager this worker writes through
    pub fn manager(&self) -> &OperationsManager {
        &self.manager
    }

    /// Process operation `id` to completion
    ///
    /// Never returns an error: every failure is recorded on the operation.
    pub async fn process(&self, id: &str) -> WorkerOutcome {
        let operation = match self.manager.get(id) {
            Ok(op) => op,
            Err(_) => {
                debug!("Operation {} vanished before the worker started", id);
                return WorkerOutcome::Vanished;
            }
        };
        if operation.status == OperationStatus::Cancelled || operation.cancel_token.is_cancelled() {
            info!("Operation {} was cancelled before it started", id);
            return self.settle_cancelled(id);
        }
        if operation.status != OperationStatus::Pending {
            info!("Operation {} is already {}, not starting", id, operation.status);
            return WorkerOutcome::NotPending(operation.status);
        }

        match self.run(&operation).await {
            Ok(()) => WorkerOutcome::Completed,
            Err(e) if e.is_cancelled() => {
                info!("Operation {} stopped after cancellation", id);
                self.settle_cancelled(id)
            }
            Err(e) => self.record_failure(id, &e),
        }
    }

    async fn run(&self, operation: &Operation) -> Result<(), WorkerError> {
        let id = operation.id.as_str();
        let token = &operation.cancel_token;

        self.manager.update_status(id, OperationStatus::Processing)?;
        self.checkpoint(id, token)?;

        self.manager.update_progress(
            id,
            &ProgressUpdate::at(Phase::Parsing, 0).with_step("Parsing file"),
        )?;
        let data = self.parse(operation).await?;
        self.checkpoint(id, token)?;

        self.manager.update_progress(
            id,
            &ProgressUpdate::at(Phase::Parsing, 0)
                .with_step(format!("Parsed {} rows", data.data.row_count))
                .with_total_rows(data.data.row_count)
                .with_rows_processed(0),
        )?;

        let sink = |update: ProgressUpdate| -> Result<(), ExtractorError> {
            if token.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }
            match self.manager.update_progress(id, &update) {
                Ok(op) if op.status == OperationStatus::Cancelled => Err(ExtractorError::Cancelled),
                Ok(_) => Ok(()),
                Err(e) => Err(ExtractorError::Internal(e.to_string())),
            }
        };

        let result = self
            .orchestrator
            .extract(&data, &operation.request.context, Some(&sink))
            .await?;

        self.checkpoint(id, token)?;
        self.manager.complete(id, result)?;
        Ok(())
    }

    /// Parse the uploaded file on a blocking thread
    async fn parse(&self, operation: &Operation) -> Result<NormalizedData, WorkerError> {
        let parser = Arc::clone(&self.parser);
        let request = Arc::clone(&operation.request);

        let data = tokio::task::spawn_blocking(move || {
            let options = ParseOptions {
                sheet_name: request.sheet_name.clone(),
            };
            parser.parse(&request.file, &request.filename, &options)
        })
        .await
        .map_err(|e| WorkerError::Task(format!("parser task failed: {}", e)))??;

        debug!(
            "Operation {}: parsed {} rows x {} columns",
            operation.id, data.data.row_count, data.data.column_count
        );
        Ok(data)
    }

    /// Fail with the cancellation sentinel if the operation was cancelled
    fn checkpoint(&self, id: &str, token: &CancellationToken) -> Result<(), WorkerError> {
        if token.is_cancelled() || self.manager.get(id)?.status == OperationStatus::Cancelled {
            return Err(ExtractorError::Cancelled.into());
        }
        Ok(())
    }

    /// Outcome for a run stopped by its cancellation token
    ///
    /// A deleted or swept operation also cancels its token, so a missing
    /// operation is reported as vanished. If our own processing transition
    /// overwrote a concurrent cancel, the cancelled status is put back
    /// without moving `cancelled_at`.
    fn settle_cancelled(&self, id: &str) -> WorkerOutcome {
        let current = match self.manager.get(id) {
            Ok(op) => op,
            Err(_) => {
                debug!("Operation {} vanished while running", id);
                return WorkerOutcome::Vanished;
            }
        };
        if !current.status.is_terminal() {
            debug!("Operation {} was cancelled while starting, restoring status", id);
            if let Err(e) = self.manager.restore_cancelled(id) {
                debug!("Operation {} vanished while restoring status: {}", id, e);
                return WorkerOutcome::Vanished;
            }
        }
        WorkerOutcome::Cancelled
    }

    /// Classify `err` and mark the operation failed
    ///
    /// Operations that vanished or were cancelled meanwhile are left alone.
    pub fn record_failure(&self, id: &str, err: &WorkerError) -> WorkerOutcome {
        let current = match self.manager.get(id) {
            Ok(op) => op,
            Err(_) => {
                debug!("Operation {} vanished, dropping error: {}", id, err);
                return WorkerOutcome::Vanished;
            }
        };
        if current.status == OperationStatus::Cancelled {
            debug!("Operation {} already cancelled, dropping error: {}", id, err);
            return WorkerOutcome::Cancelled;
        }

        let info = err.to_error_info(current.phase(), self.include_error_details);
        let code = info.code;
        match self.manager.fail(id, info) {
            Ok(_) => WorkerOutcome::Failed(code),
            Err(e) => {
                error!("Could not record failure for operation {}: {}", id, e);
                WorkerOutcome::Vanished
            }
        }
    }
}
