//! HTTP request handlers for the extraction service.
//!
//! Thin wrappers over [`OperationsManager`]: submit an upload, poll, cancel,
//! delete, and read the flattened output of a completed operation.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use chrono::{DateTime, Utc};
use colmap_domain::{DataParser, ExtractionContext, LlmProvider};
use colmap_extractor::{ExtractionStats, FinalRow, ResultMapper, SourceColumns};
use colmap_operations::{
    ExtractionRequest, OperationError, OperationStatus, OperationView, OperationsManager,
    SharedSweepMetrics, SweepMetrics,
};
use colmap_pipeline::ExtractionWorker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Starts background processing for a freshly created operation
pub trait Dispatch: Send + Sync {
    /// Hand operation `operation_id` to a worker; must not block
    fn dispatch(self: Arc<Self>, operation_id: String);
}

impl<L, P> Dispatch for ExtractionWorker<L, P>
where
    L: LlmProvider + 'static,
    P: DataParser + 'static,
{
    fn dispatch(self: Arc<Self>, operation_id: String) {
        // Detached; the supervisor inside records any failure.
        drop(colmap_pipeline::dispatch(self, operation_id));
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Operation lifecycle
    pub manager: OperationsManager,
    /// Background worker launcher
    pub dispatcher: Arc<dyn Dispatch>,
    /// Flattens completed results for the output endpoint
    pub mapper: ResultMapper,
    /// Sweeper counters, reported by the health endpoint
    pub sweep_metrics: SharedSweepMetrics,
}

/// Response to an accepted upload
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// Identifier to poll
    pub operation_id: String,
    /// Always `pending` at submission
    pub status: OperationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Flattened output of a completed operation
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    /// One `field -> value` map per row
    pub rows: Vec<FinalRow>,
    /// Aggregate numbers
    pub stats: ExtractionStats,
    /// Target fields present in the output
    pub mapped_fields: Vec<String>,
    /// Source columns by usage
    pub source_columns: SourceColumns,
}

/// Short listing entry
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    /// Operation identifier
    pub operation_id: String,
    /// Current status
    pub status: OperationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Uploaded filename
    pub filename: String,
    /// Latest reported percentage, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
}

/// Response for `GET /operations`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    /// Operations per status
    pub counts: BTreeMap<OperationStatus, usize>,
    /// Newest first
    pub operations: Vec<OperationSummary>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall health status
    pub status: String,
    /// Operations per status
    pub operations: BTreeMap<OperationStatus, usize>,
    /// Sweeper counters
    pub sweeps: SweepMetrics,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Unknown operation
    NotFound(String),
    /// Request conflicts with the operation's state
    Conflict(String),
    /// Malformed request
    BadRequest(String),
    /// Internal server error
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<OperationError> for AppError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::NotFound(_) => AppError::NotFound(e.to_string()),
            OperationError::NotCancellable { .. } => AppError::Conflict(e.to_string()),
        }
    }
}

/// Collects the multipart fields of an upload
async fn read_upload(mut multipart: Multipart) -> Result<ExtractionRequest, AppError> {
    let mut file = None;
    let mut sheet_name = None;
    let mut context = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read file: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            "sheetName" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read sheetName: {}", e)))?;
                let text = text.trim();
                if !text.is_empty() {
                    sheet_name = Some(text.to_string());
                }
            }
            "context" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read context: {}", e)))?;
                let parsed: ExtractionContext = serde_json::from_str(&text)
                    .map_err(|e| AppError::BadRequest(format!("context is not valid JSON: {}", e)))?;
                context = Some(parsed);
            }
            other => warn!("Ignoring unknown multipart field '{}'", other),
        }
    }

    let (filename, bytes) = file.ok_or_else(|| AppError::BadRequest("missing 'file' field".to_string()))?;
    if filename.is_empty() {
        return Err(AppError::BadRequest("uploaded file has no filename".to_string()));
    }
    let context = context.ok_or_else(|| AppError::BadRequest("missing 'context' field".to_string()))?;
    context.validate().map_err(AppError::BadRequest)?;

    Ok(ExtractionRequest {
        file: bytes,
        filename,
        sheet_name,
        context,
    })
}

/// POST /extractions - Accept an upload and start processing
async fn submit_extraction(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    let request = read_upload(multipart).await?;
    let filename = request.filename.clone();
    let op = state.manager.create(request);
    info!("Accepted {} as operation {}", filename, op.id);

    Arc::clone(&state.dispatcher).dispatch(op.id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            operation_id: op.id,
            status: op.status,
            created_at: op.created_at,
        }),
    ))
}

/// GET /operations/:id - Poll an operation
async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OperationView>, AppError> {
    Ok(Json(state.manager.get(&id)?.view()))
}

/// POST /operations/:id/cancel - Request cancellation
async fn cancel_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OperationView>, AppError> {
    let op = state.manager.cancel(&id)?;
    info!("Operation {} cancelled", id);
    Ok(Json(op.view()))
}

/// DELETE /operations/:id - Drop an operation
async fn delete_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.manager.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /operations/:id/output - Flattened rows of a completed operation
async fn get_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OutputResponse>, AppError> {
    let op = state.manager.get(&id)?;
    if op.status != OperationStatus::Completed {
        return Err(AppError::Conflict(format!(
            "operation {} is {}, output is available once completed",
            id, op.status
        )));
    }
    let result = op
        .result
        .ok_or_else(|| AppError::Internal(format!("operation {} completed without a result", id)))?;

    Ok(Json(OutputResponse {
        rows: state.mapper.to_final_output(&result),
        stats: state.mapper.extraction_stats(&result),
        mapped_fields: state.mapper.mapped_fields(&result),
        source_columns: state.mapper.source_columns(&result),
    }))
}

/// GET /operations - Counts and summaries
async fn list_operations(State(state): State<AppState>) -> Json<ListResponse> {
    let operations = state
        .manager
        .list()
        .into_iter()
        .map(|op| OperationSummary {
            percent_complete: op.progress.as_ref().map(|p| p.percent_complete),
            filename: op.request.filename.clone(),
            operation_id: op.id,
            status: op.status,
            created_at: op.created_at,
        })
        .collect();

    Json(ListResponse {
        counts: state.manager.status_counts(),
        operations,
    })
}

/// GET /health - Liveness plus store and sweeper numbers
async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        operations: state.manager.status_counts(),
        sweeps: state.sweep_metrics.snapshot(),
    })
}

/// Create the axum router with all routes
pub fn create_router(state: AppState, max_upload_bytes: usize) -> AxumRouter {
    AxumRouter::new()
        .route("/extractions", post(submit_extraction))
        .route("/operations", get(list_operations))
        .route("/operations/:id", get(get_operation).delete(delete_operation))
        .route("/operations/:id/cancel", post(cancel_operation))
        .route("/operations/:id/output", get(get_output))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
