//! Integration tests for the extraction worker

use async_trait::async_trait;
use colmap_domain::{
    DataParser, ExtractionContext, FieldDefinition, InferenceConfig, LlmProvider, NormalizedData,
    ParseError, ParseOptions, Phase,
};
use colmap_extractor::{ExtractionOrchestrator, ExtractorConfig};
use colmap_llm::{LlmError, MockProvider};
use colmap_operations::{
    ErrorCode, ExtractionRequest, OperationStatus, OperationStore, OperationsConfig,
    OperationsManager,
};
use colmap_pipeline::{dispatch, ExtractionWorker, UploadParser, WorkerOutcome};
use std::io::Write;
use std::sync::Arc;

const DIRECT_DISCOVERY: &str = r#"{
    "directMappings": {
        "person_name": {"sourceColumn": "Name", "confidence": 9},
        "person_age": {"sourceColumn": "Age", "confidence": 8}
    },
    "compoundColumns": {},
    "unmappedFields": []
}"#;

fn manager_with(config: OperationsConfig) -> OperationsManager {
    OperationsManager::new(Arc::new(OperationStore::new(config)))
}

fn worker<L: LlmProvider + 'static>(manager: &OperationsManager, llm: L) -> ExtractionWorker<L, UploadParser> {
    worker_with_parser(manager, llm, UploadParser::new())
}

fn worker_with_parser<L, P>(manager: &OperationsManager, llm: L, parser: P) -> ExtractionWorker<L, P>
where
    L: LlmProvider + 'static,
    P: DataParser + 'static,
{
    let orchestrator = ExtractionOrchestrator::new(Arc::new(llm), ExtractorConfig::default());
    ExtractionWorker::new(manager.clone(), orchestrator, parser)
}

fn request(filename: &str, body: &str) -> ExtractionRequest {
    request_bytes(filename, body.as_bytes().to_vec())
}

fn request_bytes(filename: &str, file: Vec<u8>) -> ExtractionRequest {
    ExtractionRequest {
        file,
        filename: filename.to_string(),
        sheet_name: None,
        context: ExtractionContext::new(
            "people",
            vec![
                FieldDefinition::new("person_name", "full name"),
                FieldDefinition::new("person_age", "age in years"),
            ],
        ),
    }
}

fn people() -> ExtractionRequest {
    request("people.csv", "Name,Age\nAnn,30\nBob,41\n")
}

/// Provider that cancels every cancellable operation while "thinking"
struct CancellingProvider {
    manager: OperationsManager,
    response: String,
}

#[async_trait]
impl LlmProvider for CancellingProvider {
    type Error = LlmError;

    async fn infer(&self, _prompt: &str, _config: &InferenceConfig) -> Result<String, Self::Error> {
        for op in self.manager.list() {
            if op.status.is_cancellable() {
                self.manager.cancel(&op.id).ok();
            }
        }
        Ok(self.response.clone())
    }
}

/// Provider that deletes every operation while "thinking"
struct DeletingProvider {
    manager: OperationsManager,
    response: String,
}

#[async_trait]
impl LlmProvider for DeletingProvider {
    type Error = LlmError;

    async fn infer(&self, _prompt: &str, _config: &InferenceConfig) -> Result<String, Self::Error> {
        for op in self.manager.list() {
            self.manager.delete(&op.id).ok();
        }
        Ok(self.response.clone())
    }
}

/// Parser that cancels every cancellable operation, then parses normally
struct CancellingParser {
    manager: OperationsManager,
    inner: UploadParser,
}

impl DataParser for CancellingParser {
    fn parse(
        &self,
        bytes: &[u8],
        filename: &str,
        options: &ParseOptions,
    ) -> Result<NormalizedData, ParseError> {
        for op in self.manager.list() {
            if op.status.is_cancellable() {
                self.manager.cancel(&op.id).ok();
            }
        }
        self.inner.parse(bytes, filename, options)
    }

    fn supports(&self, filename: &str) -> bool {
        self.inner.supports(filename)
    }
}

/// Single-sheet .xlsx whose cells are inline strings
fn xlsx(sheet: &str, rows: &[&[&str]]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    let workbook = format!(
        r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        sheet
    );
    let rels = r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/></Relationships>"#;
    let data: String = rows
        .iter()
        .map(|cells| {
            let cells: String = cells
                .iter()
                .map(|c| format!(r#"<c t="inlineStr"><is><t>{}</t></is></c>"#, c))
                .collect();
            format!("<row>{}</row>", cells)
        })
        .collect();
    let worksheet = format!("<worksheet><sheetData>{}</sheetData></worksheet>", data);

    for (name, body) in [
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", rels),
        ("xl/worksheets/sheet1.xml", worksheet.as_str()),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Provider that panics on every call
struct PanickingProvider;

#[async_trait]
impl LlmProvider for PanickingProvider {
    type Error = LlmError;

    async fn infer(&self, _prompt: &str, _config: &InferenceConfig) -> Result<String, Self::Error> {
        panic!("provider exploded");
    }
}

#[tokio::test]
async fn test_worker_completes_operation() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let op = manager.create(people());

    let outcome = worker.process(&op.id).await;
    assert_eq!(outcome, WorkerOutcome::Completed);

    let done = manager.get(&op.id).unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());
    assert!(done.failed_at.is_none() && done.cancelled_at.is_none());

    let progress = done.progress.unwrap();
    assert_eq!(progress.percent_complete, 100);
    assert_eq!(progress.phase, Phase::Mapping);
    assert_eq!(progress.total_rows, 2);

    let result = done.result.unwrap();
    assert_eq!(result.data.len(), 2);
    assert_eq!(result.data[0].direct["Name"].target_field, "person_name");
    assert_eq!(result.data[1].direct["Age"].target_field, "person_age");
    assert_eq!(result.metadata.extraction_summary.direct_mappings, 2);
    assert_eq!(result.metadata.extraction_summary.llm_calls, 1);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_worker_completes_workbook_sheet() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let file = xlsx("People", &[&["Name", "Age"], &["Ann", "30"], &["Bob", "41"]]);
    let mut req = request_bytes("people.xlsx", file);
    req.sheet_name = Some("People".to_string());
    let op = manager.create(req);

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Completed);

    let result = manager.get(&op.id).unwrap().result.unwrap();
    assert_eq!(result.data.len(), 2);
    assert_eq!(result.data[1].direct["Name"].value, "Bob");
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_missing_sheet_is_parse_error() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let mut req = request_bytes("people.xlsx", xlsx("People", &[&["Name"], &["Ann"]]));
    req.sheet_name = Some("Q3".to_string());
    let op = manager.create(req);

    assert_eq!(
        worker.process(&op.id).await,
        WorkerOutcome::Failed(ErrorCode::ParseError)
    );
    let error = manager.get(&op.id).unwrap().error.unwrap();
    assert!(error.message.contains("Q3"));
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_unsupported_format_fails_in_parsing() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let op = manager.create(request("book.ods", "PK..."));

    let outcome = worker.process(&op.id).await;
    assert_eq!(outcome, WorkerOutcome::Failed(ErrorCode::UnsupportedFormat));

    let failed = manager.get(&op.id).unwrap();
    assert_eq!(failed.status, OperationStatus::Failed);
    assert!(failed.result.is_none());
    let error = failed.error.unwrap();
    assert_eq!(error.code, ErrorCode::UnsupportedFormat);
    assert_eq!(error.phase, Some(Phase::Parsing));
    assert!(error.details.is_some());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_csv_is_parse_error() {
    let manager = manager_with(OperationsConfig::default());
    let worker = worker(&manager, MockProvider::new(DIRECT_DISCOVERY));
    let op = manager.create(request("people.csv", "Name\n\"unterminated\n"));

    assert_eq!(
        worker.process(&op.id).await,
        WorkerOutcome::Failed(ErrorCode::ParseError)
    );
}

#[tokio::test]
async fn test_malformed_llm_output_is_llm_error() {
    let manager = manager_with(OperationsConfig::production());
    let worker = worker(&manager, MockProvider::new("no json here"));
    let op = manager.create(people());

    assert_eq!(
        worker.process(&op.id).await,
        WorkerOutcome::Failed(ErrorCode::LlmError)
    );

    let error = manager.get(&op.id).unwrap().error.unwrap();
    assert_eq!(error.phase, Some(Phase::Discovery));
    assert!(error.details.is_none(), "production config hides details");
}

#[tokio::test]
async fn test_provider_failure_is_llm_error() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::default();
    llm.push_error("model overloaded");
    let worker = worker(&manager, llm);
    let op = manager.create(people());

    assert_eq!(
        worker.process(&op.id).await,
        WorkerOutcome::Failed(ErrorCode::LlmError)
    );
    let error = manager.get(&op.id).unwrap().error.unwrap();
    assert!(error.message.contains("model overloaded"));
}

#[tokio::test]
async fn test_cancel_between_llm_calls_ends_cancelled() {
    let manager = manager_with(OperationsConfig::default());
    let llm = CancellingProvider {
        manager: manager.clone(),
        response: r#"{"compoundColumns": {"Name": ["person_name"]}}"#.to_string(),
    };
    let worker = worker(&manager, llm);
    let op = manager.create(people());

    let outcome = worker.process(&op.id).await;
    assert_eq!(outcome, WorkerOutcome::Cancelled);

    let cancelled = manager.get(&op.id).unwrap();
    assert_eq!(cancelled.status, OperationStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert!(cancelled.completed_at.is_none());
    assert!(cancelled.failed_at.is_none());
    assert!(cancelled.result.is_none());
    assert!(cancelled.error.is_none());
}

#[tokio::test]
async fn test_cancelled_before_start_is_not_processed() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let op = manager.create(people());
    manager.cancel(&op.id).unwrap();

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Cancelled);

    let after = manager.get(&op.id).unwrap();
    assert_eq!(after.status, OperationStatus::Cancelled);
    assert!(after.started_at.is_none());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_during_parsing_stops_before_extraction() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let parser = CancellingParser {
        manager: manager.clone(),
        inner: UploadParser::new(),
    };
    let worker = worker_with_parser(&manager, llm.clone(), parser);
    let op = manager.create(people());

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Cancelled);

    let cancelled = manager.get(&op.id).unwrap();
    assert_eq!(cancelled.status, OperationStatus::Cancelled);
    assert!(cancelled.started_at.is_some());
    assert!(cancelled.cancelled_at.is_some());
    assert!(cancelled.completed_at.is_none());
    assert!(cancelled.result.is_none());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_overwritten_cancel_is_restored_with_first_timestamp() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());
    let op = manager.create(people());
    let cancelled_at = manager.cancel(&op.id).unwrap().cancelled_at;

    // a processing write that raced the cancel and landed second
    manager.update_status(&op.id, OperationStatus::Processing).unwrap();

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Cancelled);

    let after = manager.get(&op.id).unwrap();
    assert_eq!(after.status, OperationStatus::Cancelled);
    assert_eq!(after.cancelled_at, cancelled_at);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_operation_past_pending_is_not_restarted() {
    let manager = manager_with(OperationsConfig::default());
    let llm = MockProvider::new(DIRECT_DISCOVERY);
    let worker = worker(&manager, llm.clone());

    let running = manager.create(people());
    manager.update_status(&running.id, OperationStatus::Processing).unwrap();
    assert_eq!(
        worker.process(&running.id).await,
        WorkerOutcome::NotPending(OperationStatus::Processing)
    );
    assert_eq!(manager.get(&running.id).unwrap().status, OperationStatus::Processing);

    let done = manager.create(people());
    assert_eq!(worker.process(&done.id).await, WorkerOutcome::Completed);
    let completed_at = manager.get(&done.id).unwrap().completed_at;
    assert_eq!(
        worker.process(&done.id).await,
        WorkerOutcome::NotPending(OperationStatus::Completed)
    );
    assert_eq!(manager.get(&done.id).unwrap().completed_at, completed_at);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_cancel_after_completion_is_rejected() {
    let manager = manager_with(OperationsConfig::default());
    let worker = worker(&manager, MockProvider::new(DIRECT_DISCOVERY));
    let op = manager.create(people());

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Completed);
    assert!(manager.cancel(&op.id).is_err());
    assert_eq!(manager.get(&op.id).unwrap().status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_missing_operation_is_vanished() {
    let manager = manager_with(OperationsConfig::default());
    let worker = worker(&manager, MockProvider::new(DIRECT_DISCOVERY));
    assert_eq!(worker.process("does-not-exist").await, WorkerOutcome::Vanished);
}

#[tokio::test]
async fn test_deleted_mid_flight_is_vanished_and_not_recreated() {
    let manager = manager_with(OperationsConfig::default());
    let llm = DeletingProvider {
        manager: manager.clone(),
        response: DIRECT_DISCOVERY.to_string(),
    };
    let worker = worker(&manager, llm);
    let op = manager.create(people());

    assert_eq!(worker.process(&op.id).await, WorkerOutcome::Vanished);
    assert!(!manager.exists(&op.id));
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_dispatch_runs_detached() {
    let manager = manager_with(OperationsConfig::default());
    let worker = Arc::new(worker(&manager, MockProvider::new(DIRECT_DISCOVERY)));
    let op = manager.create(people());

    let outcome = dispatch(worker, op.id.clone()).await.unwrap();

    assert_eq!(outcome, WorkerOutcome::Completed);
    assert_eq!(manager.get(&op.id).unwrap().status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_dispatch_records_worker_panic() {
    let manager = manager_with(OperationsConfig::default());
    let worker = Arc::new(worker(&manager, PanickingProvider));
    let op = manager.create(people());

    let outcome = dispatch(worker, op.id.clone()).await.unwrap();
    assert_eq!(outcome, WorkerOutcome::Failed(ErrorCode::ExtractionError));

    let failed = manager.get(&op.id).unwrap();
    assert_eq!(failed.status, OperationStatus::Failed);
    let error = failed.error.unwrap();
    assert!(error.message.contains("provider exploded"));
    assert_eq!(error.phase, Some(Phase::Discovery));
}
