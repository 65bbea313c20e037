//! End-to-end tests for the extraction pipeline

#[cfg(test)]
mod tests {
    use crate::{ExtractionOrchestrator, ExtractorConfig, ExtractorError, ProgressSink, ResultMapper};
    use colmap_domain::{
        DataSource, ExtractionContext, FieldDefinition, NormalizedData, Phase, ProgressUpdate, Row,
    };
    use colmap_llm::MockProvider;
    use std::sync::{Arc, Mutex};

    const DISCOVERY: &str = "You are mapping the columns";
    const COMPOUND: &str = "Each value below packs";

    fn table(headers: &[&str], rows: &[Vec<&str>]) -> NormalizedData {
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
                filename: "people.csv".to_string(),
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
            "test records",
            fields
                .iter()
                .map(|f| FieldDefinition::new(*f, format!("the {}", f)))
                .collect(),
        )
    }

    fn orchestrator(llm: &MockProvider) -> ExtractionOrchestrator<MockProvider> {
        ExtractionOrchestrator::new(Arc::new(llm.clone()), ExtractorConfig::default())
    }

    #[tokio::test]
    async fn test_direct_only_extraction() {
        let llm = MockProvider::default().with_response(
            DISCOVERY,
            r#"{
                "directMappings": {
                    "name": {"sourceColumn": "Name", "confidence": 8},
                    "age": {"sourceColumn": "Age", "confidence": 10}
                },
                "compoundColumns": {},
                "unmappedFields": []
            }"#,
        );
        let data = table(&["Name", "Age"], &[vec!["Ann", "30"], vec!["Bob", "41"]]);

        let result = orchestrator(&llm)
            .extract(&data, &context(&["name", "age"]), None)
            .await
            .unwrap();

        let summary = &result.metadata.extraction_summary;
        assert_eq!(summary.direct_mappings, 2);
        assert_eq!(summary.compound_extractions, 0);
        assert_eq!(summary.llm_calls, 1);
        assert!(summary.unmapped_columns.is_empty());
        assert!((summary.average_confidence - 9.0).abs() < 1e-9);
        assert_eq!(result.metadata.rows_processed, 2);
        assert_eq!(llm.call_count(), 1);

        assert_eq!(result.data.len(), 2);
        assert_eq!(result.data[1].direct["Name"].value, "Bob");
        assert_eq!(result.data[1].direct["Name"].target_field, "name");
        assert!(result.data[0].compound.is_empty());
    }

    #[tokio::test]
    async fn test_compound_extraction() {
        let llm = MockProvider::default()
            .with_response(
                DISCOVERY,
                r#"{
                    "directMappings": {"name": {"sourceColumn": "Name", "confidence": 9}},
                    "compoundColumns": {"OrderRef": ["year", "region"]},
                    "unmappedFields": ["email"]
                }"#,
            )
            .with_response(
                COMPOUND,
                r#"{"extractions": [
                    {"rowIndex": 0, "sourceColumn": "OrderRef",
                     "fields": {"year": {"value": "2024", "confidence": 9},
                                "region": {"value": "NYC", "confidence": 8}}},
                    {"rowIndex": 1, "sourceColumn": "OrderRef",
                     "fields": {"year": {"value": "2023", "confidence": 9}}}
                ]}"#,
            );
        let data = table(
            &["Name", "OrderRef", "Notes"],
            &[
                vec!["Ann", "ORD-2024-NYC", "vip"],
                vec!["Bob", "ORD-2023-XX", ""],
            ],
        );

        let result = orchestrator(&llm)
            .extract(&data, &context(&["name", "year", "region", "email"]), None)
            .await
            .unwrap();

        let summary = &result.metadata.extraction_summary;
        assert_eq!(summary.direct_mappings, 1);
        assert_eq!(summary.compound_extractions, 2);
        assert_eq!(summary.llm_calls, 2);
        assert_eq!(summary.unmapped_columns, vec!["Notes"]);
        assert_eq!(summary.unmapped_fields, vec!["email"]);

        let first = &result.data[0].compound["OrderRef"];
        assert_eq!(first.source_value, "ORD-2024-NYC");
        assert_eq!(first.extractions[0].target_field, "year");
        assert_eq!(first.extractions[0].extracted_value.as_deref(), Some("2024"));

        // The LLM skipped region for row 1
        let second = &result.data[1].compound["OrderRef"];
        assert_eq!(second.extractions[1].target_field, "region");
        assert_eq!(second.extractions[1].extracted_value, None);
        assert_eq!(second.extractions[1].confidence, 0.0);

        assert_eq!(result.data[0].unmapped["Notes"], "vip");
        assert!(!result.data[0].unmapped.contains_key("Name"));
    }

    #[tokio::test]
    async fn test_large_table_is_sampled_for_discovery() {
        let llm = MockProvider::new(r#"{"directMappings": {"id": {"sourceColumn": "Id", "confidence": 10}}}"#);
        let rows: Vec<Vec<String>> = (0..120).map(|i| vec![format!("row-{}", i)]).collect();
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        let data = table(&["Id"], &rows);

        let result = orchestrator(&llm)
            .extract(&data, &context(&["id"]), None)
            .await
            .unwrap();

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("row-29"));
        assert!(!prompt.contains("row-30"));
        assert_eq!(result.data.len(), 120);
        assert_eq!(result.data[119].direct["Id"].value, "row-119");
    }

    #[tokio::test]
    async fn test_compound_extraction_is_chunked() {
        let llm = MockProvider::default();
        llm.push_response(r#"{"compoundColumns": {"Code": ["a", "b"]}}"#);
        let rows: Vec<Vec<String>> = (0..40)
            .map(|i| vec![format!("{}-{}-{}", "x".repeat(30), i, "y".repeat(30))])
            .collect();
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
        let data = table(&["Code"], &rows);

        let config = ExtractorConfig {
            chunk_token_budget: 300,
            ..ExtractorConfig::default()
        };
        // Every chunk answers for row 0 only; the rest stay empty
        llm.add_response(
            COMPOUND,
            r#"[{"rowIndex": 0, "sourceColumn": "Code", "fields": {"a": {"value": "x", "confidence": 6}}}]"#,
        );

        let progress = Mutex::new(Vec::new());
        let sink = |update: ProgressUpdate| -> Result<(), ExtractorError> {
            if update.phase == Some(Phase::Extraction) {
                progress.lock().unwrap().push(update.percent_complete.unwrap_or(0));
            }
            Ok(())
        };

        let orchestrator = ExtractionOrchestrator::new(Arc::new(llm.clone()), config);
        let result = orchestrator
            .extract(&data, &context(&["a", "b"]), Some(&sink))
            .await
            .unwrap();

        let calls = result.metadata.extraction_summary.llm_calls;
        assert!(calls > 2, "expected several chunks, got {} calls", calls);
        assert_eq!(llm.call_count(), calls);

        let chunk_prompts: Vec<String> = llm.prompts().into_iter().skip(1).collect();
        assert!(chunk_prompts[0].contains("\n0: "));
        assert!(!chunk_prompts[1].contains("\n0: "));
        assert!(chunk_prompts.last().unwrap().contains("\n39: "));

        let progress = progress.into_inner().unwrap();
        assert_eq!(progress.first(), Some(&35));
        assert_eq!(progress.last(), Some(&85));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(result.data[0].compound["Code"].extractions[0].extracted_value.as_deref(), Some("x"));
        assert_eq!(result.data[39].compound["Code"].extractions[0].extracted_value, None);
    }

    #[tokio::test]
    async fn test_malformed_discovery_response_fails() {
        let llm = MockProvider::new("I could not find any mappings, sorry.");
        let data = table(&["Name"], &[vec!["Ann"]]);

        let result = orchestrator(&llm)
            .extract(&data, &context(&["name"]), None)
            .await;

        assert!(matches!(result, Err(ExtractorError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_llm_failure_is_reported() {
        let llm = MockProvider::default();
        llm.push_error("connection refused");
        let data = table(&["Name"], &[vec!["Ann"]]);

        let result = orchestrator(&llm)
            .extract(&data, &context(&["name"]), None)
            .await;

        match result {
            Err(ExtractorError::Llm(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected LLM error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_before_compound_pass() {
        let llm = MockProvider::default()
            .with_response(DISCOVERY, r#"{"compoundColumns": {"Code": ["a"]}}"#)
            .with_response(COMPOUND, r#"{"extractions": []}"#);
        let data = table(&["Code"], &[vec!["A-1"]]);

        struct CancelAt(u8);
        impl ProgressSink for CancelAt {
            fn report(&self, update: ProgressUpdate) -> Result<(), ExtractorError> {
                if update.percent_complete == Some(self.0) {
                    Err(ExtractorError::Cancelled)
                } else {
                    Ok(())
                }
            }
        }

        let result = orchestrator(&llm)
            .extract(&data, &context(&["a"]), Some(&CancelAt(35)))
            .await;

        assert!(matches!(result, Err(ExtractorError::Cancelled)));
        assert_eq!(llm.call_count(), 1, "compound call must not run after cancel");
    }

    #[tokio::test]
    async fn test_pipeline_output_through_mapper() {
        let llm = MockProvider::default()
            .with_response(
                DISCOVERY,
                r#"{"directMappings": {"name": {"sourceColumn": "Name", "confidence": 9}},
                    "compoundColumns": {"Ref": ["code"]}}"#,
            )
            .with_response(
                COMPOUND,
                r#"{"extractions": [{"rowIndex": 0, "sourceColumn": "Ref",
                    "fields": {"code": {"value": null, "confidence": 2}}}]}"#,
            );
        let data = table(&["Name", "Ref"], &[vec!["Ann", "??"]]);

        let result = orchestrator(&llm)
            .extract(&data, &context(&["name", "code"]), None)
            .await
            .unwrap();

        let mapper = ResultMapper::default();
        let rows = mapper.to_final_output(&result);
        assert_eq!(rows[0]["name"], Some("Ann".to_string()));
        assert_eq!(rows[0]["code"], None);

        let stats = mapper.extraction_stats(&result);
        assert_eq!(stats.low_confidence_count, 1);
        assert_eq!(mapper.mapped_fields(&result), vec!["code", "name"]);
    }
}
