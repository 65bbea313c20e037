//! Detached worker dispatch with panic supervision

use crate::error::WorkerError;
use crate::worker::{ExtractionWorker, WorkerOutcome};
use colmap_domain::{DataParser, LlmProvider};
use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

/// Run the worker for operation `id` on a background task
///
/// The caller may drop the returned handle; the run continues. A second
/// task supervises the first, so a panic inside the worker still ends with
/// the operation marked failed (`EXTRACTION_ERROR`) instead of stuck in
/// processing.
pub fn dispatch<L, P>(worker: Arc<ExtractionWorker<L, P>>, id: String) -> JoinHandle<WorkerOutcome>
where
    L: LlmProvider + 'static,
    P: DataParser + 'static,
{
    let run_worker = Arc::clone(&worker);
    let run_id = id.clone();
    let run = tokio::spawn(async move { run_worker.process(&run_id).await });

    tokio::spawn(async move {
        match run.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    format!("worker panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "worker task was aborted".to_string()
                };
                error!("Operation {}: {}", id, reason);
                worker.record_failure(&id, &WorkerError::Task(reason))
            }
        }
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
