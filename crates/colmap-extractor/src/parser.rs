//! Parse LLM output into discovery and compound extraction results
//!
//! Malformed JSON, or a response missing its top-level structure, is a hard
//! failure. Individual malformed entries inside an otherwise valid response
//! are skipped with a warning.

use crate::error::ExtractorError;
use colmap_domain::{CompoundExtraction, DirectMapping, DiscoveryResult, ExtractedField};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Confidence scores are clamped into this range
const MAX_CONFIDENCE: f64 = 10.0;

/// Parse the discovery pass response
pub fn parse_discovery_response(response: &str) -> Result<DiscoveryResult, ExtractorError> {
    let json = parse_json(response)?;
    let obj = json
        .as_object()
        .ok_or_else(|| ExtractorError::InvalidResponse("Expected JSON object".to_string()))?;

    let mut result = DiscoveryResult::default();

    if let Some(direct) = optional_object(obj, "directMappings")? {
        for (target_field, mapping) in direct {
            match parse_direct_mapping(mapping) {
                Ok(m) => {
                    result.direct_mappings.insert(target_field.clone(), m);
                }
                Err(e) => warn!("Skipping direct mapping for '{}': {}", target_field, e),
            }
        }
    }

    if let Some(compound) = optional_object(obj, "compoundColumns")? {
        for (source_column, targets) in compound {
            match string_list(targets) {
                Ok(fields) if !fields.is_empty() => {
                    result.compound_columns.insert(source_column.clone(), fields);
                }
                Ok(_) => warn!("Compound column '{}' lists no target fields", source_column),
                Err(e) => warn!("Skipping compound column '{}': {}", source_column, e),
            }
        }
    }

    if let Some(unmapped) = obj.get("unmappedFields") {
        result.unmapped_fields = string_list(unmapped).map_err(|e| {
            ExtractorError::InvalidResponse(format!("Invalid 'unmappedFields': {}", e))
        })?;
    }

    Ok(result)
}

/// Parse a compound extraction pass response
///
/// Accepts either `{"extractions": [...]}` or a bare array.
pub fn parse_compound_response(response: &str) -> Result<Vec<CompoundExtraction>, ExtractorError> {
    let json = parse_json(response)?;

    let items = match &json {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("extractions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ExtractorError::InvalidResponse("Missing 'extractions' array".to_string())
            })?,
        _ => {
            return Err(ExtractorError::InvalidResponse(
                "Expected JSON object or array".to_string(),
            ))
        }
    };

    let mut extractions = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match parse_compound_item(item) {
            Ok(extraction) => extractions.push(extraction),
            Err(e) => warn!("Failed to parse extraction {}: {}", idx, e),
        }
    }

    Ok(extractions)
}

fn parse_json(response: &str) -> Result<Value, ExtractorError> {
    let json_str = extract_json(response)?;
    serde_json::from_str(&json_str)
        .map_err(|e| ExtractorError::InvalidResponse(format!("JSON parse error: {}", e)))
}

/// Extract JSON from response, handling markdown code blocks and stray prose
fn extract_json(response: &str) -> Result<String, ExtractorError> {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() < 2 {
            return Err(ExtractorError::InvalidResponse("Empty code block".to_string()));
        }

        // Skip first line (```json or ```) and a closing fence if present
        let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
            lines.len() - 1
        } else {
            lines.len()
        };
        return Ok(lines[1..end].join("\n"));
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed.to_string());
    }

    // Prose around a JSON object: take the outermost braces
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(trimmed[start..=end].to_string()),
        _ => Err(ExtractorError::InvalidResponse(
            "No JSON found in response".to_string(),
        )),
    }
}

fn optional_object<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ExtractorError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(_) => Err(ExtractorError::InvalidResponse(format!(
            "'{}' must be an object",
            key
        ))),
    }
}

fn parse_direct_mapping(json: &Value) -> Result<DirectMapping, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Mapping is not a JSON object".to_string())?;

    let source_column = obj
        .get("sourceColumn")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing or invalid 'sourceColumn'".to_string())?
        .to_string();

    let confidence = obj
        .get("confidence")
        .and_then(number)
        .ok_or_else(|| "Missing or invalid 'confidence'".to_string())?;

    Ok(DirectMapping {
        source_column,
        confidence: clamp_confidence(confidence),
    })
}

fn parse_compound_item(json: &Value) -> Result<CompoundExtraction, String> {
    let obj = json
        .as_object()
        .ok_or_else(|| "Extraction is not a JSON object".to_string())?;

    let row_index = obj
        .get("rowIndex")
        .and_then(number)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .ok_or_else(|| "Missing or invalid 'rowIndex'".to_string())? as usize;

    let source_column = obj
        .get("sourceColumn")
        .and_then(Value::as_str)
        .ok_or_else(|| "Missing or invalid 'sourceColumn'".to_string())?
        .to_string();

    let raw_fields = obj
        .get("fields")
        .and_then(Value::as_object)
        .ok_or_else(|| "Missing or invalid 'fields'".to_string())?;

    let mut fields = BTreeMap::new();
    for (target_field, value) in raw_fields {
        fields.insert(target_field.clone(), parse_extracted_field(value));
    }

    Ok(CompoundExtraction {
        row_index,
        source_column,
        fields,
    })
}

/// Field values may come back as `{value, confidence}` or as a bare scalar
fn parse_extracted_field(json: &Value) -> ExtractedField {
    match json {
        Value::Object(obj) => {
            let value = obj.get("value").and_then(scalar_text);
            let confidence = obj.get("confidence").and_then(number).unwrap_or(0.0);
            ExtractedField {
                confidence: if value.is_some() {
                    clamp_confidence(confidence)
                } else {
                    0.0
                },
                value,
            }
        }
        other => {
            let value = scalar_text(other);
            ExtractedField {
                confidence: 0.0,
                value,
            }
        }
    }
}

fn scalar_text(json: &Value) -> Option<String> {
    match json {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number(json: &Value) -> Option<f64> {
    match json {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(json: &Value) -> Result<Vec<String>, String> {
    let items = json
        .as_array()
        .ok_or_else(|| "Expected an array of strings".to_string())?;
    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn clamp_confidence(confidence: f64) -> f64 {
    confidence.clamp(0.0, MAX_CONFIDENCE)
}
