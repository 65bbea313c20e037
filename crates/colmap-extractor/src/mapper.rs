//! Flattening of extraction results for downstream consumers
//!
//! The mapper reads structural information (field names, column groups)
//! from the first row only. The orchestrator applies one schema to every
//! row, so the first row is representative.

use colmap_domain::{ExtractedRowData, ExtractionResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Confidence below which an extraction counts as low-confidence
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 5.0;

/// One flattened row: target field to value (`None` when not extracted)
pub type FinalRow = BTreeMap<String, Option<String>>;

/// Source columns grouped by how they were used
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumns {
    /// Columns copied directly into a target field
    pub direct: Vec<String>,
    /// Columns split into several target fields
    pub compound: Vec<String>,
    /// Columns not used for any target field
    pub unmapped: Vec<String>,
}

/// Aggregate numbers over a finished extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    /// Rows in the result
    pub total_rows: usize,
    /// Direct mappings per row
    pub direct_mappings: usize,
    /// Compound field extractions per row
    pub compound_extractions: usize,
    /// Mean over every confidence value in every row
    pub average_confidence: f64,
    /// Values below the low-confidence threshold
    pub low_confidence_count: usize,
}

/// Turns an [`ExtractionResult`] into flat rows and summary views
#[derive(Debug, Clone, Copy)]
pub struct ResultMapper {
    low_confidence_threshold: f64,
}

impl Default for ResultMapper {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_CONFIDENCE_THRESHOLD)
    }
}

impl ResultMapper {
    /// Create a mapper with a custom low-confidence threshold
    pub fn new(low_confidence_threshold: f64) -> Self {
        Self {
            low_confidence_threshold,
        }
    }

    /// Flatten every row into `target field -> value`
    ///
    /// Unmapped columns are left out. When a target field is produced by
    /// both a direct mapping and a compound extraction, the direct value wins.
    pub fn to_final_output(&self, result: &ExtractionResult) -> Vec<FinalRow> {
        result.data.iter().map(flatten_row).collect()
    }

    /// Sorted set of target fields present in the output
    pub fn mapped_fields(&self, result: &ExtractionResult) -> Vec<String> {
        let Some(first) = result.data.first() else {
            return Vec::new();
        };

        let fields: BTreeSet<&str> = first
            .direct
            .values()
            .map(|d| d.target_field.as_str())
            .chain(
                first
                    .compound
                    .values()
                    .flat_map(|c| c.extractions.iter().map(|e| e.target_field.as_str())),
            )
            .collect();

        fields.into_iter().map(str::to_string).collect()
    }

    /// Source column names grouped by direct, compound and unmapped
    pub fn source_columns(&self, result: &ExtractionResult) -> SourceColumns {
        result
            .data
            .first()
            .map(|first| SourceColumns {
                direct: first.direct.keys().cloned().collect(),
                compound: first.compound.keys().cloned().collect(),
                unmapped: first.unmapped.keys().cloned().collect(),
            })
            .unwrap_or_default()
    }

    /// Row count, per-row mapping counts and confidence figures
    pub fn extraction_stats(&self, result: &ExtractionResult) -> ExtractionStats {
        let (direct_mappings, compound_extractions) = result
            .data
            .first()
            .map(|first| {
                (
                    first.direct.len(),
                    first.compound.values().map(|c| c.extractions.len()).sum(),
                )
            })
            .unwrap_or((0, 0));

        let confidences: Vec<f64> = result.data.iter().flat_map(row_confidences).collect();
        let average_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        let low_confidence_count = confidences
            .iter()
            .filter(|c| **c < self.low_confidence_threshold)
            .count();

        ExtractionStats {
            total_rows: result.data.len(),
            direct_mappings,
            compound_extractions,
            average_confidence,
            low_confidence_count,
        }
    }
}

fn flatten_row(row: &ExtractedRowData) -> FinalRow {
    let mut out = FinalRow::new();

    for compound in row.compound.values() {
        for extraction in &compound.extractions {
            out.insert(
                extraction.target_field.clone(),
                extraction.extracted_value.clone(),
            );
        }
    }

    for direct in row.direct.values() {
        if out.contains_key(&direct.target_field) {
            debug!(
                "Target field '{}' produced by both a direct mapping and a compound column, keeping direct value",
                direct.target_field
            );
        }
        out.insert(direct.target_field.clone(), Some(direct.value.clone()));
    }

    out
}

fn row_confidences(row: &ExtractedRowData) -> impl Iterator<Item = f64> + '_ {
    row.direct.values().map(|d| d.confidence).chain(
        row.compound
            .values()
            .flat_map(|c| c.extractions.iter().map(|e| e.confidence)),
    )
}
