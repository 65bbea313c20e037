//! LLM prompt construction for the discovery and compound extraction passes

use colmap_domain::{ExtractionContext, FieldDefinition, NormalizedData};
use serde::Serialize;

/// One cell handed to the compound extraction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedValue {
    /// Row in the full table
    pub row_index: usize,

    /// Cell value
    pub value: String,
}

/// Everything the compound pass needs to know about one source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundInput {
    /// Compound source column
    pub source_column: String,

    /// Target fields to pull out of each value
    pub fields_to_extract: Vec<FieldDefinition>,

    /// Values, tagged with their full-table row index
    pub values: Vec<IndexedValue>,
}

/// Builds the discovery prompt from a (sampled) table and the target schema
pub struct DiscoveryPromptBuilder<'a> {
    sample: &'a NormalizedData,
    context: &'a ExtractionContext,
    total_rows: usize,
}

impl<'a> DiscoveryPromptBuilder<'a> {
    /// Create a new prompt builder
    pub fn new(sample: &'a NormalizedData, context: &'a ExtractionContext) -> Self {
        Self {
            sample,
            context,
            total_rows: sample.data.row_count,
        }
    }

    /// Tell the model how many rows the full table has
    pub fn with_total_rows(mut self, total_rows: usize) -> Self {
        self.total_rows = total_rows;
        self
    }

    /// Build the complete discovery prompt
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(DISCOVERY_INSTRUCTIONS);
        prompt.push_str("\n\n");

        prompt.push_str(&format!("Data description: {}\n\n", self.context.description));

        prompt.push_str("Target fields:\n");
        for field in &self.context.fields {
            prompt.push_str(&format!("- {}: {}\n", field.field, field.description));
        }
        prompt.push('\n');

        let headers = &self.sample.data.headers;
        prompt.push_str(&format!(
            "Source file: {} ({} rows total, {} shown)\n",
            self.sample.source.filename,
            self.total_rows,
            self.sample.data.row_count
        ));
        prompt.push_str("---\n");
        prompt.push_str(&format!("| {} |\n", headers.join(" | ")));
        for row in &self.sample.data.rows {
            let cells: Vec<&str> = headers
                .iter()
                .map(|h| row.get(h).map(String::as_str).unwrap_or(""))
                .collect();
            prompt.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        prompt.push_str("---\n\n");

        prompt.push_str(DISCOVERY_OUTPUT_FORMAT);

        prompt
    }
}

/// Builds the compound extraction prompt for a set of column inputs
pub struct CompoundPromptBuilder<'a> {
    context: &'a ExtractionContext,
    inputs: &'a [CompoundInput],
}

impl<'a> CompoundPromptBuilder<'a> {
    /// Create a new prompt builder
    pub fn new(context: &'a ExtractionContext, inputs: &'a [CompoundInput]) -> Self {
        Self { context, inputs }
    }

    /// Build the complete compound extraction prompt
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str(COMPOUND_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(&format!("Data description: {}\n\n", self.context.description));

        for input in self.inputs {
            prompt.push_str(&format!("Column \"{}\" encodes:\n", input.source_column));
            for field in &input.fields_to_extract {
                prompt.push_str(&format!("- {}: {}\n", field.field, field.description));
            }
            prompt.push_str("Values:\n");
            for v in &input.values {
                // serde_json quoting keeps embedded quotes and newlines unambiguous
                let quoted = serde_json::to_string(&v.value).unwrap_or_else(|_| v.value.clone());
                prompt.push_str(&format!("{}: {}\n", v.row_index, quoted));
            }
            prompt.push('\n');
        }

        prompt.push_str(COMPOUND_OUTPUT_FORMAT);

        prompt
    }
}

const DISCOVERY_INSTRUCTIONS: &str = r#"You are mapping the columns of a spreadsheet onto a target schema.

For every target field decide exactly one of:
- DIRECT: one source column holds the value as-is.
- COMPOUND: one source column packs several target fields into a single value
  (for example an order reference "ORD-2024-NYC" holding a year and a region).
- UNMAPPED: no source column carries the field.

Rules:
- A target field appears in at most one of directMappings, compoundColumns, unmappedFields
- Use source column names exactly as they appear in the header row
- Confidence is an integer from 1 (guess) to 10 (certain)
- Only flag a column as compound when the values clearly combine several fields"#;

const DISCOVERY_OUTPUT_FORMAT: &str = r#"Output format (JSON object only, no additional text):
{
  "directMappings": {
    "target_field": { "sourceColumn": "Column Name", "confidence": 9 }
  },
  "compoundColumns": {
    "Column Name": ["target_field_a", "target_field_b"]
  },
  "unmappedFields": ["target_field_c"]
}

Remember: Return ONLY valid JSON, no markdown code blocks, no explanations."#;

const COMPOUND_INSTRUCTIONS: &str = r#"Each value below packs several target fields into one string.
Extract every listed field from every value.

Rules:
- Copy text from the value; do not invent data that is not present
- Use null when a field cannot be found in a value
- Confidence is an integer from 1 (guess) to 10 (certain)
- Return one entry per (row, column) pair, keeping the row numbers shown"#;

const COMPOUND_OUTPUT_FORMAT: &str = r#"Output format (JSON object only, no additional text):
{
  "extractions": [
    {
      "rowIndex": 0,
      "sourceColumn": "Column Name",
      "fields": {
        "target_field_a": { "value": "extracted text", "confidence": 9 },
        "target_field_b": { "value": null, "confidence": 0 }
      }
    }
  ]
}

Remember: Return ONLY valid JSON, no markdown code blocks, no explanations."#;
