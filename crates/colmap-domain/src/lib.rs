//! Colmap Domain Layer
//!
//! Shared data model and trait seams for the column-mapping pipeline.
//! Every other crate in the workspace depends on this one; it carries no
//! I/O of its own.
//!
//! ## Key Concepts
//!
//! - **NormalizedData**: A parsed table (headers + string rows) with its source
//! - **ExtractionContext**: The user-declared target schema
//! - **DiscoveryResult**: How the LLM proposes to map source columns onto target fields
//! - **CompoundExtraction**: Per-row values pulled out of columns that encode several fields
//! - **ExtractionResult**: The categorized output (direct / compound / unmapped) per row
//! - **Progress**: Phase and percentage reporting for long-running operations
//!
//! ## Seams
//!
//! - [`traits::LlmProvider`]: prompt in, text out
//! - [`traits::DataParser`]: file bytes in, [`NormalizedData`] out

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod data;
pub mod discovery;
pub mod error;
pub mod progress;
pub mod result;
pub mod traits;

// Re-exports for convenience
pub use context::{ExtractionContext, FieldDefinition};
pub use data::{DataSource, NormalizedData, ParseMetadata, Row, TabularData};
pub use discovery::{CompoundExtraction, DirectMapping, DiscoveryResult, ExtractedField};
pub use error::ParseError;
pub use progress::{Phase, Progress, ProgressUpdate};
pub use result::{
    CompoundValue, DirectValue, ExtractedRowData, ExtractionMetadata, ExtractionResult,
    ExtractionSummary, FieldExtraction, SourceInfo,
};
pub use traits::{DataParser, InferenceConfig, LlmProvider, ParseOptions};
