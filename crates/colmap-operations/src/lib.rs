//! Colmap Operations
//!
//! Lifecycle management for asynchronous extraction jobs.
//!
//! # Overview
//!
//! An upload becomes an [`Operation`] that a client polls until it reaches
//! a terminal status. This crate owns the records and their transitions:
//!
//! - **[`OperationStore`]**: in-memory keyed storage with per-status TTLs
//! - **[`OperationsManager`]**: creation, progress merging, completion,
//!   failure and guarded cancellation
//! - **[`Sweeper`]**: background task evicting expired operations
//!
//! # State Machine
//!
//! | From | To | Driven by |
//! |------|----|-----------|
//! | pending | processing | worker |
//! | processing | completed / failed | worker |
//! | pending, processing | cancelled | [`OperationsManager::cancel`] |
//!
//! Completed, failed and cancelled are terminal.
//!
//! # Retention
//!
//! | Status | Default TTL |
//! |--------|-------------|
//! | pending | 30 minutes |
//! | processing | 60 minutes |
//! | completed | 24 hours |
//! | failed | 24 hours |
//! | cancelled | 60 minutes |
//!
//! # Example
//!
//! ```
//! use colmap_operations::{ExtractionRequest, OperationStore, OperationsManager, OperationStatus};
//! use colmap_domain::{ExtractionContext, FieldDefinition};
//! use std::sync::Arc;
//!
//! let manager = OperationsManager::new(Arc::new(OperationStore::default()));
//! let op = manager.create(ExtractionRequest {
//!     file: b"Name\nAnn\n".to_vec(),
//!     filename: "people.csv".to_string(),
//!     sheet_name: None,
//!     context: ExtractionContext::new("people", vec![FieldDefinition::new("name", "full name")]),
//! });
//!
//! let cancelled = manager.cancel(&op.id).unwrap();
//! assert_eq!(cancelled.status, OperationStatus::Cancelled);
//! assert!(manager.cancel(&op.id).is_err());
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod metrics;
mod operation;
mod store;
mod sweeper;

pub use config::OperationsConfig;
pub use error::OperationError;
pub use manager::OperationsManager;
pub use metrics::{SharedSweepMetrics, SweepMetrics};
pub use operation::{
    ErrorCode, ExtractionRequest, Operation, OperationErrorInfo, OperationPatch, OperationStatus,
    OperationView,
};
pub use store::OperationStore;
pub use sweeper::{Sweeper, SweeperHandle};
