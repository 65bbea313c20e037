//! Colmap Pipeline
//!
//! Connects uploads, the extraction pipeline and the operation lifecycle.
//!
//! # Overview
//!
//! - **[`ExtractionWorker`]**: takes one operation from pending to a
//!   terminal status: parse, extract, complete or fail
//! - **[`dispatch`]**: runs a worker detached from the request that
//!   created the operation, under a supervisor that records panics
//! - **[`UploadParser`]**: [`DataParser`](colmap_domain::DataParser) that
//!   routes uploads by extension to [`DelimitedParser`] (CSV/TSV) or
//!   [`WorkbookParser`] (.xlsx/.xlsm)
//! - **[`WorkerError`]**: classification of failures into error codes
//!
//! # Flow
//!
//! ```text
//! OperationsManager::create → dispatch → ExtractionWorker::process
//!     → UploadParser::parse → ExtractionOrchestrator::extract
//!     → OperationsManager::complete | fail
//! ```
//!
//! # Error Codes
//!
//! | Source | Code |
//! |--------|------|
//! | `ParseError::UnsupportedFormat` | `UNSUPPORTED_FORMAT` |
//! | any other `ParseError` | `PARSE_ERROR` |
//! | LLM call failure, timeout or unusable response | `LLM_ERROR` |
//! | anything else, including a worker panic | `EXTRACTION_ERROR` |

#![warn(missing_docs)]

mod dispatch;
mod error;
mod parser;
mod workbook;
mod worker;

pub use dispatch::dispatch;
pub use error::WorkerError;
pub use parser::{DelimitedParser, UploadParser};
pub use workbook::WorkbookParser;
pub use worker::{ExtractionWorker, WorkerOutcome};
