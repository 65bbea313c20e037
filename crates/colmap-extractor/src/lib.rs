//! Colmap Extractor
//!
//! Maps the columns of a parsed spreadsheet onto a user-declared schema
//! using two LLM passes.
//!
//! # Overview
//!
//! The first pass (discovery) sees a bounded sample of the table and
//! classifies every target field as a direct copy of one source column, as
//! packed inside a compound column, or as unmapped. The second pass runs
//! only when compound columns exist: it asks the LLM to split every value
//! of those columns, chunking the rows when the prompt would exceed the
//! token budget. Finally every row of the full table is assembled into an
//! [`ExtractionResult`](colmap_domain::ExtractionResult).
//!
//! # Architecture
//!
//! ```text
//! NormalizedData → Sampler → discovery LLM call → DiscoveryResult
//!                → compound LLM calls (chunked) → per-row assembly
//!                → ResultMapper → flat rows
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use colmap_extractor::{ExtractionOrchestrator, ExtractorConfig, ResultMapper};
//! use colmap_domain::{ExtractionContext, FieldDefinition, NormalizedData};
//! use std::sync::Arc;
//!
//! # async fn example<L: colmap_domain::LlmProvider>(llm: L, data: NormalizedData) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ExtractionOrchestrator::new(Arc::new(llm), ExtractorConfig::default());
//! let context = ExtractionContext::new(
//!     "customer orders",
//!     vec![FieldDefinition::new("customerName", "full name of the customer")],
//! );
//!
//! let result = orchestrator.extract(&data, &context, None).await?;
//! let rows = ResultMapper::default().to_final_output(&result);
//! println!("{} rows, {} LLM calls", rows.len(), result.metadata.extraction_summary.llm_calls);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod chunking;
mod config;
mod error;
mod mapper;
mod orchestrator;
mod parser;
mod prompt;
mod sampler;

#[cfg(test)]
mod tests;

pub use chunking::{chunk_progress_percent, RowChunker, EXTRACTION_END_PERCENT, EXTRACTION_START_PERCENT};
pub use config::ExtractorConfig;
pub use error::ExtractorError;
pub use mapper::{
    ExtractionStats, FinalRow, ResultMapper, SourceColumns, DEFAULT_LOW_CONFIDENCE_THRESHOLD,
};
pub use orchestrator::{ExtractionOrchestrator, ProgressSink};
pub use parser::{parse_compound_response, parse_discovery_response};
pub use prompt::{CompoundInput, CompoundPromptBuilder, DiscoveryPromptBuilder, IndexedValue};
pub use sampler::{Sampler, DEFAULT_SAMPLE_SIZE, DEFAULT_SAMPLE_THRESHOLD};
