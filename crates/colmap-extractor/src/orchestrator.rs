//! Two-pass extraction pipeline
//!
//! ```text
//! sample → discovery LLM call → [compound LLM calls, chunked] → per-row mapping
//! ```
//!
//! Progress is reported at fixed points (5, 10, 30, 35, per chunk up to 85,
//! 90, 100). Every report is also a cancellation checkpoint: a
//! [`ProgressSink`] that returns an error aborts the run with that error.

use crate::chunking::{chunk_progress_percent, RowChunker, EXTRACTION_END_PERCENT, EXTRACTION_START_PERCENT};
use crate::config::ExtractorConfig;
use crate::error::ExtractorError;
use crate::parser::{parse_compound_response, parse_discovery_response};
use crate::prompt::{CompoundInput, CompoundPromptBuilder, DiscoveryPromptBuilder, IndexedValue};
use crate::sampler::Sampler;
use chrono::Utc;
use colmap_domain::{
    CompoundExtraction, CompoundValue, DirectValue, DiscoveryResult, ExtractedField,
    ExtractedRowData, ExtractionContext, ExtractionMetadata, ExtractionResult, ExtractionSummary,
    FieldExtraction, InferenceConfig, LlmProvider, NormalizedData, Phase, ProgressUpdate,
    SourceInfo,
};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info};

/// Receives progress updates from the orchestrator
///
/// Returning an error stops the pipeline at that point; the worker uses
/// this to surface [`ExtractorError::Cancelled`].
pub trait ProgressSink: Send + Sync {
    /// Handle one update
    fn report(&self, update: ProgressUpdate) -> Result<(), ExtractorError>;
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) -> Result<(), ExtractorError> + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) -> Result<(), ExtractorError> {
        self(update)
    }
}

fn report(progress: Option<&dyn ProgressSink>, update: ProgressUpdate) -> Result<(), ExtractorError> {
    match progress {
        Some(sink) => sink.report(update),
        None => Ok(()),
    }
}

/// Output of the compound pass
struct CompoundOutcome {
    extractions: Vec<CompoundExtraction>,
    llm_calls: usize,
}

/// Drives discovery, compound extraction and result assembly
pub struct ExtractionOrchestrator<L>
where
    L: LlmProvider,
{
    llm: Arc<L>,
    config: ExtractorConfig,
    sampler: Sampler,
    chunker: RowChunker,
}

impl<L> ExtractionOrchestrator<L>
where
    L: LlmProvider,
{
    /// Create a new orchestrator
    pub fn new(llm: Arc<L>, config: ExtractorConfig) -> Self {
        let sampler = Sampler::new(config.sample_threshold, config.sample_size);
        let chunker = RowChunker::new(config.chunk_token_budget);
        Self {
            llm,
            config,
            sampler,
            chunker,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Run the full pipeline over `data`
    ///
    /// `data` is the full, unsampled table; sampling only affects the
    /// discovery prompt.
    pub async fn extract(
        &self,
        data: &NormalizedData,
        context: &ExtractionContext,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<ExtractionResult, ExtractorError> {
        let started = Instant::now();
        let total_rows = data.data.row_count;

        info!(
            "Starting extraction for '{}': {} rows, {} columns, {} target fields",
            data.source.filename,
            total_rows,
            data.data.column_count,
            context.fields.len()
        );

        report(
            progress,
            ProgressUpdate::at(Phase::Discovery, 5)
                .with_step("Sampling rows")
                .with_total_rows(total_rows),
        )?;
        let sample = self.sampler.sample(data);

        report(
            progress,
            ProgressUpdate::at(Phase::Discovery, 10).with_step("Discovering column mappings"),
        )?;
        let discovery = self.discover(&sample, context, total_rows).await?;
        let mut llm_calls = 1;
        report(
            progress,
            ProgressUpdate::at(Phase::Discovery, 30).with_step("Column mappings discovered"),
        )?;

        let extractions = if discovery.has_compound_columns() {
            report(
                progress,
                ProgressUpdate::at(Phase::Extraction, EXTRACTION_START_PERCENT)
                    .with_step("Extracting compound columns")
                    .with_rows_processed(0),
            )?;
            let outcome = self
                .extract_compound(data, context, &discovery, progress)
                .await?;
            llm_calls += outcome.llm_calls;
            outcome.extractions
        } else {
            Vec::new()
        };

        report(
            progress,
            ProgressUpdate::at(Phase::Mapping, 90)
                .with_step("Mapping rows")
                .with_rows_processed(total_rows),
        )?;
        let (rows, summary) = assemble(data, &discovery, &extractions, llm_calls);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Extraction complete for '{}': {} direct, {} compound, {} LLM calls, {}ms",
            data.source.filename,
            summary.direct_mappings,
            summary.compound_extractions,
            summary.llm_calls,
            processing_time_ms
        );

        report(
            progress,
            ProgressUpdate::at(Phase::Mapping, 100).with_step("Extraction complete"),
        )?;

        Ok(ExtractionResult {
            data: rows,
            metadata: ExtractionMetadata {
                source: SourceInfo {
                    filename: data.source.filename.clone(),
                    sheet: data.source.sheet.clone(),
                },
                rows_processed: total_rows,
                extraction_summary: summary,
                processing_time_ms,
                completed_at: Utc::now(),
            },
        })
    }

    /// Discovery pass over the sampled table
    async fn discover(
        &self,
        sample: &NormalizedData,
        context: &ExtractionContext,
        total_rows: usize,
    ) -> Result<DiscoveryResult, ExtractorError> {
        let prompt = DiscoveryPromptBuilder::new(sample, context)
            .with_total_rows(total_rows)
            .build();

        let response = self
            .call_llm(&prompt, &self.config.discovery_inference)
            .await?;
        let discovery = parse_discovery_response(&response)?;

        info!(
            "Discovery: {} direct mappings, {} compound columns, {} unmapped fields",
            discovery.direct_mappings.len(),
            discovery.compound_columns.len(),
            discovery.unmapped_fields.len()
        );

        Ok(discovery)
    }

    /// Compound pass; one LLM call per row chunk, issued sequentially
    async fn extract_compound(
        &self,
        data: &NormalizedData,
        context: &ExtractionContext,
        discovery: &DiscoveryResult,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<CompoundOutcome, ExtractorError> {
        let total_rows = data.data.row_count;
        let all_inputs = compound_inputs(data, context, discovery, 0..total_rows);
        let prompt = CompoundPromptBuilder::new(context, &all_inputs).build();
        let estimated_tokens = self.llm.estimate_token_count(&prompt);
        let ranges = self.chunker.plan(total_rows, estimated_tokens);

        if ranges.len() == 1 {
            debug!("Compound prompt ~{} tokens, single call", estimated_tokens);
            let response = self
                .call_llm(&prompt, &self.config.compound_inference)
                .await?;
            let extractions = parse_compound_response(&response)?;
            report(
                progress,
                ProgressUpdate::at(Phase::Extraction, EXTRACTION_END_PERCENT)
                    .with_rows_processed(total_rows),
            )?;
            return Ok(CompoundOutcome {
                extractions,
                llm_calls: 1,
            });
        }

        info!(
            "Compound prompt ~{} tokens exceeds budget of {}, splitting into {} chunks",
            estimated_tokens,
            self.config.chunk_token_budget,
            ranges.len()
        );

        let mut extractions = Vec::new();
        for (idx, range) in ranges.iter().enumerate() {
            debug!("Processing chunk {}/{} (rows {:?})", idx + 1, ranges.len(), range);

            let inputs = compound_inputs(data, context, discovery, range.clone());
            let prompt = CompoundPromptBuilder::new(context, &inputs).build();
            let response = self
                .call_llm(&prompt, &self.config.compound_inference)
                .await?;
            extractions.extend(parse_compound_response(&response)?);

            report(
                progress,
                ProgressUpdate::at(Phase::Extraction, chunk_progress_percent(idx, ranges.len()))
                    .with_step(format!("Extracted chunk {}/{}", idx + 1, ranges.len()))
                    .with_rows_processed(range.end),
            )?;
        }

        Ok(CompoundOutcome {
            extractions,
            llm_calls: ranges.len(),
        })
    }

    /// Call the LLM provider with the configured timeout
    async fn call_llm(
        &self,
        prompt: &str,
        inference: &InferenceConfig,
    ) -> Result<String, ExtractorError> {
        debug!("Prompt length: {} chars", prompt.len());

        let response = timeout(self.config.llm_timeout(), self.llm.infer(prompt, inference))
            .await
            .map_err(|_| ExtractorError::Timeout(self.config.llm_timeout_secs))?
            .map_err(|e| ExtractorError::Llm(e.to_string()))?;

        debug!("LLM response length: {} chars", response.len());
        Ok(response)
    }
}

/// Per-column compound inputs restricted to `rows`
fn compound_inputs(
    data: &NormalizedData,
    context: &ExtractionContext,
    discovery: &DiscoveryResult,
    rows: Range<usize>,
) -> Vec<CompoundInput> {
    discovery
        .compound_columns
        .iter()
        .map(|(source_column, targets)| CompoundInput {
            source_column: source_column.clone(),
            fields_to_extract: context
                .fields
                .iter()
                .filter(|f| targets.contains(&f.field))
                .cloned()
                .collect(),
            values: rows
                .clone()
                .map(|row_index| IndexedValue {
                    row_index,
                    value: data.cell(row_index, source_column).unwrap_or("").to_string(),
                })
                .collect(),
        })
        .collect()
}

/// Build one output row per input row plus the summary counts
fn assemble(
    data: &NormalizedData,
    discovery: &DiscoveryResult,
    extractions: &[CompoundExtraction],
    llm_calls: usize,
) -> (Vec<ExtractedRowData>, ExtractionSummary) {
    let mut lookup: HashMap<(usize, &str, &str), &ExtractedField> = HashMap::new();
    for extraction in extractions {
        for (field, value) in &extraction.fields {
            lookup.insert(
                (extraction.row_index, extraction.source_column.as_str(), field.as_str()),
                value,
            );
        }
    }

    let claimed: HashSet<&str> = discovery.claimed_columns().into_iter().collect();
    let unmapped_columns: Vec<String> = data
        .data
        .headers
        .iter()
        .filter(|h| !claimed.contains(h.as_str()))
        .cloned()
        .collect();

    let mut confidence_sum = 0.0;
    let mut confidence_count = 0usize;
    let mut rows = Vec::with_capacity(data.data.rows.len());

    for (row_index, row) in data.data.rows.iter().enumerate() {
        let mut out = ExtractedRowData::default();

        for (target_field, mapping) in &discovery.direct_mappings {
            out.direct.insert(
                mapping.source_column.clone(),
                DirectValue {
                    value: row.get(&mapping.source_column).cloned().unwrap_or_default(),
                    target_field: target_field.clone(),
                    confidence: mapping.confidence,
                },
            );
            confidence_sum += mapping.confidence;
            confidence_count += 1;
        }

        for (source_column, targets) in &discovery.compound_columns {
            let field_extractions: Vec<FieldExtraction> = targets
                .iter()
                .map(|target| {
                    let found = lookup.get(&(row_index, source_column.as_str(), target.as_str()));
                    FieldExtraction {
                        target_field: target.clone(),
                        extracted_value: found.and_then(|f| f.value.clone()),
                        confidence: found.map(|f| f.confidence).unwrap_or(0.0),
                    }
                })
                .collect();

            for extraction in &field_extractions {
                confidence_sum += extraction.confidence;
                confidence_count += 1;
            }

            out.compound.insert(
                source_column.clone(),
                CompoundValue {
                    source_value: row.get(source_column).cloned().unwrap_or_default(),
                    extractions: field_extractions,
                },
            );
        }

        for column in &unmapped_columns {
            out.unmapped
                .insert(column.clone(), row.get(column).cloned().unwrap_or_default());
        }

        rows.push(out);
    }

    let average_confidence = if confidence_count == 0 {
        0.0
    } else {
        confidence_sum / confidence_count as f64
    };

    let summary = ExtractionSummary {
        direct_mappings: discovery.direct_mappings.len(),
        compound_extractions: discovery.compound_columns.values().map(Vec::len).sum(),
        unmapped_columns,
        unmapped_fields: discovery.unmapped_fields.clone(),
        llm_calls,
        average_confidence,
    };

    (rows, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colmap_domain::{DataSource, DirectMapping, FieldDefinition, Row};
    use colmap_llm::MockProvider;
    use std::sync::Mutex;

    fn table(headers: &[&str], rows: &[&[&str]]) -> NormalizedData {
        let rows: Vec<Row> = rows
            .iter()
            .map(|cells| {
                headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect()
            })
            .collect();
        NormalizedData::new(
            DataSource {
                filename: "test.csv".to_string(),
                source_type: "csv".to_string(),
                sheet: None,
            },
            headers.iter().map(|h| h.to_string()).collect(),
            rows,
            "test",
        )
    }

    fn context(fields: &[&str]) -> ExtractionContext {
        ExtractionContext::new(
            "test data",
            fields
                .iter()
                .map(|f| FieldDefinition::new(*f, format!("the {}", f)))
                .collect(),
        )
    }

    #[test]
    fn test_assemble_without_rows_has_zero_confidence() {
        let data = table(&["A"], &[]);
        let mut discovery = DiscoveryResult::default();
        discovery.direct_mappings.insert(
            "a".to_string(),
            DirectMapping {
                source_column: "A".to_string(),
                confidence: 7.0,
            },
        );
        let (rows, summary) = assemble(&data, &discovery, &[], 1);
        assert!(rows.is_empty());
        assert_eq!(summary.average_confidence, 0.0);
        assert!(summary.unmapped_columns.is_empty());
    }

    #[test]
    fn test_compound_inputs_restricted_to_range() {
        let data = table(&["Ref"], &[&["a"], &["b"], &["c"]]);
        let ctx = context(&["x", "y"]);
        let mut discovery = DiscoveryResult::default();
        discovery
            .compound_columns
            .insert("Ref".to_string(), vec!["y".to_string(), "unknown".to_string()]);

        let inputs = compound_inputs(&data, &ctx, &discovery, 1..3);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].fields_to_extract.len(), 1);
        assert_eq!(inputs[0].fields_to_extract[0].field, "y");
        let indices: Vec<usize> = inputs[0].values.iter().map(|v| v.row_index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert_eq!(inputs[0].values[0].value, "b");
    }

    #[tokio::test]
    async fn test_progress_sequence_without_compound_columns() {
        let llm = MockProvider::new(
            r#"{"directMappings": {"a": {"sourceColumn": "A", "confidence": 5}}}"#,
        );
        let orchestrator = ExtractionOrchestrator::new(Arc::new(llm), ExtractorConfig::default());
        let data = table(&["A"], &[&["1"]]);
        let seen = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| -> Result<(), ExtractorError> {
            seen.lock().unwrap().push((update.phase, update.percent_complete));
            Ok(())
        };

        orchestrator
            .extract(&data, &context(&["a"]), Some(&sink))
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(
            seen,
            vec![
                (Some(Phase::Discovery), Some(5)),
                (Some(Phase::Discovery), Some(10)),
                (Some(Phase::Discovery), Some(30)),
                (Some(Phase::Mapping), Some(90)),
                (Some(Phase::Mapping), Some(100)),
            ]
        );
    }

    #[tokio::test]
    async fn test_sink_error_stops_pipeline() {
        let llm = MockProvider::new("{}");
        let orchestrator =
            ExtractionOrchestrator::new(Arc::new(llm.clone()), ExtractorConfig::default());
        let data = table(&["A"], &[&["1"]]);
        let sink = |update: ProgressUpdate| -> Result<(), ExtractorError> {
            if update.percent_complete == Some(30) {
                Err(ExtractorError::Cancelled)
            } else {
                Ok(())
            }
        };

        let result = orchestrator.extract(&data, &context(&["a"]), Some(&sink)).await;
        assert!(matches!(result, Err(ExtractorError::Cancelled)));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_llm_timeout() {
        let llm = MockProvider::new("{}").with_delay(std::time::Duration::from_secs(5));
        let config = ExtractorConfig {
            llm_timeout_secs: 1,
            ..ExtractorConfig::default()
        };
        let orchestrator = ExtractionOrchestrator::new(Arc::new(llm), config);
        let data = table(&["A"], &[&["1"]]);

        let result = orchestrator.extract(&data, &context(&["a"]), None).await;
        assert!(matches!(result, Err(ExtractorError::Timeout(1))));
    }
}
