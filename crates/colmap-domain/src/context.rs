//! Extraction context - the user-declared target schema

use serde::{Deserialize, Serialize};

/// A single target field the caller wants populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Target field name (e.g., "order_year")
    pub field: String,

    /// Free-text description shown to the LLM
    pub description: String,
}

impl FieldDefinition {
    /// Create a new field definition
    pub fn new(field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            description: description.into(),
        }
    }
}

/// User-declared schema the pipeline maps source columns onto
///
/// `fields` is expected to be non-empty; that is checked at the request
/// boundary via [`ExtractionContext::validate`], not inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionContext {
    /// What the data is about
    pub description: String,

    /// Target fields, in caller order
    pub fields: Vec<FieldDefinition>,
}

impl ExtractionContext {
    /// Create a new extraction context
    pub fn new(description: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            description: description.into(),
            fields,
        }
    }

    /// Look up a field definition by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Boundary validation: at least one field, no blank names, no duplicates
    pub fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("fields must contain at least one entry".to_string());
        }
        for (idx, f) in self.fields.iter().enumerate() {
            if f.field.trim().is_empty() {
                return Err(format!("fields[{}].field must not be empty", idx));
            }
            if self.fields[..idx].iter().any(|prev| prev.field == f.field) {
                return Err(format!("duplicate field '{}'", f.field));
            }
        }
        Ok(())
    }
}
