//! Terminal output of the extraction pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A source cell mapped directly onto a target field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectValue {
    /// Cell value ("" when the row lacks the column)
    pub value: String,

    /// Target field this column feeds
    pub target_field: String,

    /// Discovery confidence, 1-10
    pub confidence: f64,
}

/// One target field pulled out of a compound cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldExtraction {
    /// Target field name
    pub target_field: String,

    /// Extracted value, `None` when the LLM returned nothing for it
    pub extracted_value: Option<String>,

    /// Extraction confidence, 0 when the LLM returned nothing
    pub confidence: f64,
}

/// A compound cell and everything extracted from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundValue {
    /// Original cell value
    pub source_value: String,

    /// One entry per target field discovery assigned to the column
    pub extractions: Vec<FieldExtraction>,
}

/// One output row, keyed by source column in every section
///
/// Every row produced by the orchestrator carries the same keys in each
/// section; the result mapper reads only the first row for schema questions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRowData {
    /// source column → direct value
    pub direct: BTreeMap<String, DirectValue>,

    /// source column → compound extraction
    pub compound: BTreeMap<String, CompoundValue>,

    /// source column → raw value, for columns nothing claimed
    pub unmapped: BTreeMap<String, String>,
}

/// Source file reference carried into the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Uploaded filename
    pub filename: String,

    /// Worksheet, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

/// Counts and aggregates for one extraction run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    /// Number of direct mappings discovery produced
    pub direct_mappings: usize,

    /// Number of compound target fields (counted per field, not per column)
    pub compound_extractions: usize,

    /// Source columns nothing claimed, in header order
    pub unmapped_columns: Vec<String>,

    /// Target fields discovery could not map
    pub unmapped_fields: Vec<String>,

    /// LLM calls made across both passes
    pub llm_calls: usize,

    /// Mean of every direct and compound confidence recorded (0 if none)
    pub average_confidence: f64,
}

/// Metadata attached to an [`ExtractionResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    /// Source file reference
    pub source: SourceInfo,

    /// Rows in the full table
    pub rows_processed: usize,

    /// Counts and aggregates
    pub extraction_summary: ExtractionSummary,

    /// Wall-clock duration of the pipeline
    pub processing_time_ms: u64,

    /// When the result was produced
    pub completed_at: DateTime<Utc>,
}

/// Categorized per-row output of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// One entry per row of the full table
    pub data: Vec<ExtractedRowData>,

    /// Run metadata
    pub metadata: ExtractionMetadata,
}
