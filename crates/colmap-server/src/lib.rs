//! Colmap Server
//!
//! HTTP front end for asynchronous column-mapping extractions. Uploads are
//! accepted as operations, processed by a background worker, and polled by
//! id until they reach a terminal state.

#![warn(missing_docs)]

pub mod config;
pub mod handlers;

use colmap_extractor::{ExtractionOrchestrator, ResultMapper};
use colmap_llm::OllamaProvider;
use colmap_operations::{OperationStore, OperationsManager, Sweeper};
use colmap_pipeline::{ExtractionWorker, UploadParser};
use config::ServerConfig;
use handlers::{create_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Server binding error
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Start the extraction HTTP server
///
/// Wires the Ollama provider, operation store, worker, and sweeper, then
/// serves until Ctrl+C. The sweeper is stopped after the listener drains.
pub async fn start_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;

    info!("Starting colmap server");
    info!("Bind address: {}", config.bind_addr());
    info!("LLM: {} at {}", config.llm.model, config.llm.endpoint);
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    let provider = OllamaProvider::with_timeout(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    )
    .with_max_retries(config.llm.max_retries);

    let store = Arc::new(OperationStore::new(config.operations.clone()));
    let manager = OperationsManager::new(Arc::clone(&store));

    let orchestrator = ExtractionOrchestrator::new(Arc::new(provider), config.extractor.clone());
    let worker = Arc::new(ExtractionWorker::new(
        manager.clone(),
        orchestrator,
        UploadParser::new(),
    ));

    let sweeper = Sweeper::new(Arc::clone(&store), &config.operations).spawn();
    info!(
        "Sweeper every {} min; TTLs (min): pending {}, processing {}, completed {}, failed {}, cancelled {}",
        config.operations.sweep_interval_minutes,
        config.operations.pending_ttl_minutes,
        config.operations.processing_ttl_minutes,
        config.operations.completed_ttl_minutes,
        config.operations.failed_ttl_minutes,
        config.operations.cancelled_ttl_minutes,
    );

    let state = AppState {
        manager,
        dispatcher: worker,
        mapper: ResultMapper::new(config.extractor.low_confidence_threshold),
        sweep_metrics: sweeper.shared_metrics(),
    };

    let app = create_router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(&config.bind_addr()).await?;
    info!("Server listening on {}", config.bind_addr());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Server(e.to_string()));

    sweeper.shutdown().await;
    info!("Server stopped");

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        // Without a signal handler, serve until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.llm.model, "llama3.1");
    }

    #[tokio::test]
    async fn test_start_server_rejects_invalid_config() {
        let config = ServerConfig {
            max_upload_bytes: 0,
            ..ServerConfig::default()
        };
        let err = start_server(config).await.unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
