//! Intermediate results of the two LLM passes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A target field mapped 1:1 onto a source column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMapping {
    /// Source column holding the value
    pub source_column: String,

    /// LLM confidence, 1-10
    pub confidence: f64,
}

/// Output of the discovery pass
///
/// By convention a target field appears in at most one of the three
/// collections. That is not enforced here; see the result mapper for how
/// overlaps are resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// target field → source column
    #[serde(default)]
    pub direct_mappings: BTreeMap<String, DirectMapping>,

    /// source column → target fields encoded inside it
    #[serde(default)]
    pub compound_columns: BTreeMap<String, Vec<String>>,

    /// Target fields with no usable source
    #[serde(default)]
    pub unmapped_fields: Vec<String>,
}

impl DiscoveryResult {
    /// Whether a compound extraction pass is needed
    pub fn has_compound_columns(&self) -> bool {
        !self.compound_columns.is_empty()
    }

    /// Source columns claimed by either a direct mapping or a compound column
    pub fn claimed_columns(&self) -> Vec<&str> {
        let mut claimed: Vec<&str> = self
            .direct_mappings
            .values()
            .map(|m| m.source_column.as_str())
            .chain(self.compound_columns.keys().map(String::as_str))
            .collect();
        claimed.sort_unstable();
        claimed.dedup();
        claimed
    }
}

/// One extracted field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    /// Extracted value; `None` when the LLM found nothing
    pub value: Option<String>,

    /// LLM confidence, 1-10 (0 when absent)
    #[serde(default)]
    pub confidence: f64,
}

/// Fields pulled out of one compound cell
///
/// `row_index` indexes the full (unsampled) row set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundExtraction {
    /// Row in the full table
    pub row_index: usize,

    /// Compound source column
    pub source_column: String,

    /// target field → extracted value
    pub fields: BTreeMap<String, ExtractedField>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimed_columns_deduplicates() {
        let mut discovery = DiscoveryResult::default();
        discovery.direct_mappings.insert(
            "name".to_string(),
            DirectMapping {
                source_column: "Name".to_string(),
                confidence: 9.0,
            },
        );
        discovery.direct_mappings.insert(
            "full_name".to_string(),
            DirectMapping {
                source_column: "Name".to_string(),
                confidence: 6.0,
            },
        );
        discovery
            .compound_columns
            .insert("OrderRef".to_string(), vec!["year".to_string()]);

        assert_eq!(discovery.claimed_columns(), vec!["Name", "OrderRef"]);
        assert!(discovery.has_compound_columns());
    }

    #[test]
    fn test_deserialize_with_missing_sections() {
        let json = r#"{"directMappings": {"age": {"sourceColumn": "Age", "confidence": 8}}}"#;
        let discovery: DiscoveryResult = serde_json::from_str(json).unwrap();
        assert_eq!(discovery.direct_mappings["age"].confidence, 8.0);
        assert!(discovery.compound_columns.is_empty());
        assert!(discovery.unmapped_fields.is_empty());
    }
}
