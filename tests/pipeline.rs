//! Offline integration tests: synthetic pages through render → classify →
//! validate, with a scripted classifier standing in for the provider.
//!
//! Nothing here needs pdfium or network access.

use async_trait::async_trait;
use faxtriage::pipeline::render::{DocumentRenderResult, DocumentRenderer, RenderSettings};
use faxtriage::pipeline::request::ClassificationRequest;
use faxtriage::pipeline::response::validate_reply;
use faxtriage::{
    classify_bytes, classify_rendered, render_from_source, run_batch, run_batch_with,
    BackendError, BackendReply, ClassificationValidator, ClassifierBackend, ClassifierConfig,
    DocumentType, ExtractedFields, FailureKind, GroundTruth, PageQuality, PageSource, Priority,
    TokenUsage, TriageError,
};
use image::{DynamicImage, GrayImage, Luma};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok, block_on};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Replays a fixed list of replies, recording how many images each call saw.
struct Scripted {
    replies: Mutex<Vec<Result<BackendReply, BackendError>>>,
    calls: AtomicUsize,
    images_seen: Mutex<Vec<usize>>,
}

impl Scripted {
    fn new(mut replies: Vec<Result<BackendReply, BackendError>>) -> Self {
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
            images_seen: Mutex::new(Vec::new()),
        }
    }

    fn replying(text: &str) -> Self {
        Self::new(vec![reply(text)])
    }
}

#[async_trait]
impl ClassifierBackend for Scripted {
    async fn complete(&self, request: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images_seen.lock().unwrap().push(request.images.len());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(BackendError::new(FailureKind::Unknown, "script exhausted")))
    }

    fn model_name(&self) -> String {
        "scripted-vision".into()
    }
}

fn reply(text: &str) -> Result<BackendReply, BackendError> {
    Ok(BackendReply {
        text: text.into(),
        usage: TokenUsage::new(4200, 180),
    })
}

/// Half-black, half-white pages: bright enough and high contrast.
struct FaxPages {
    name: PathBuf,
    pages: usize,
    rendered: AtomicUsize,
}

impl FaxPages {
    fn new(name: &str, pages: usize) -> Self {
        Self {
            name: PathBuf::from(name),
            pages,
            rendered: AtomicUsize::new(0),
        }
    }
}

impl PageSource for FaxPages {
    fn origin(&self) -> &Path {
        &self.name
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn render_page(&self, _index: usize) -> Result<DynamicImage, TriageError> {
        self.rendered.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(32, 40, |x, _| {
            if x < 16 {
                Luma([20])
            } else {
                Luma([235])
            }
        })))
    }
}

/// Renders every path as a two-page synthetic fax.
struct SyntheticRenderer;

#[async_trait]
impl DocumentRenderer for SyntheticRenderer {
    async fn render(
        &self,
        pdf_path: &Path,
        config: &ClassifierConfig,
    ) -> Result<DocumentRenderResult, TriageError> {
        let name = pdf_path.file_name().and_then(|n| n.to_str()).unwrap_or("x.pdf");
        render_from_source(&FaxPages::new(name, 2), &RenderSettings::from(config))
    }
}

fn fast_config() -> ClassifierConfig {
    ClassifierConfig::builder()
        .retry_delays(Duration::from_millis(1), Duration::from_millis(1))
        .build()
        .unwrap()
}

// ── Edge-case scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn chart_dump_is_classified_from_its_first_three_pages() {
    let config = fast_config();
    let source = FaxPages::new("10_chart_dump_40pages.pdf", 40);
    let rendered = render_from_source(&source, &RenderSettings::from(&config)).unwrap();

    assert_eq!(rendered.total_page_count, 40);
    assert_eq!(rendered.pages_processed_count, 3);
    assert_eq!(source.rendered.load(Ordering::SeqCst), 3);

    let backend = Scripted::replying(
        r#"```json
{"document_type":"other","confidence":0.82,"priority":"low",
 "flags":["multi_document_bundle"],"page_count_processed":40}
```"#,
    );
    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    let out = c.outcome.output();

    assert_eq!(*backend.images_seen.lock().unwrap(), vec![3]);
    assert_eq!(out.document_type, DocumentType::Other);
    assert!(out.has_flag("multi_document_bundle"));
    // Locally known values win over whatever the model echoed.
    assert_eq!(out.page_count_processed, 3);
    assert_eq!(out.page_quality, rendered.overall_quality);

    let mut validator = ClassificationValidator::new(GroundTruth::fax_corpus());
    let r = validator
        .validate(
            "10_chart_dump_40pages.pdf",
            out.document_type.as_str(),
            out.confidence,
            out.priority.as_str(),
            out.flags.clone(),
            None,
        )
        .unwrap();
    assert!(r.correct);
    assert!(r.is_edge_case);
    assert_eq!(r.edge_case_type.as_deref(), Some("multi_document_bundle"));
}

#[tokio::test]
async fn orphan_cover_page_keeps_high_confidence_other() {
    let config = fast_config();
    let source = FaxPages::new("09_orphan_cover_page.pdf", 1);
    let rendered = render_from_source(&source, &RenderSettings::from(&config)).unwrap();

    let backend = Scripted::replying(
        r#"{"document_type":"other","confidence":0.88,"priority":"low",
            "flags":["incomplete_document"],
            "extracted_fields":{"sending_facility":"Valley Imaging","urgency_indicators":null}}"#,
    );
    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    assert!(!c.outcome.is_fallback());
    let out = c.outcome.output();
    assert_eq!(out.confidence, 0.88);
    assert_eq!(out.flags, vec!["incomplete_document"]);
    assert_eq!(
        out.extracted_fields.sending_facility.as_deref(),
        Some("Valley Imaging")
    );
    assert!(out.extracted_fields.urgency_indicators.is_empty());

    let mut validator = ClassificationValidator::new(GroundTruth::fax_corpus());
    let r = validator
        .validate("09_orphan_cover_page.pdf", "other", 0.88, "low", out.flags.clone(), None)
        .unwrap();
    assert!(r.correct);
}

// ── Response handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn prose_reply_becomes_flagged_fallback() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 2), &RenderSettings::from(&config)).unwrap();
    let backend = Scripted::replying("This appears to be a lab report from Quest Diagnostics.");

    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    assert!(c.outcome.is_fallback());
    let out = c.outcome.output();
    assert_eq!(out.document_type, DocumentType::Other);
    assert_eq!(out.confidence, 0.0);
    assert_eq!(out.flags, vec!["json_parse_error"]);
    assert_eq!(out.page_count_processed, 2);
    // Tokens are spent even when the reply is useless.
    assert_eq!(c.usage.total_tokens(), 4380);
}

#[tokio::test]
async fn reply_missing_optional_fields_gets_defaults_then_clamp() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 1), &RenderSettings::from(&config)).unwrap();
    let raw = r#"{"document_type":"lab_result"}"#;

    // The schema-validated record keeps the model's label.
    let validated = validate_reply(raw, 1, PageQuality::Good).unwrap();
    assert_eq!(validated.document_type, DocumentType::LabResult);
    assert_eq!(validated.priority, Priority::None);
    assert_eq!(validated.extracted_fields, ExtractedFields::default());
    assert!(validated.flags.is_empty());

    let backend = Scripted::replying(raw);
    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    assert!(!c.outcome.is_fallback());
    let out = c.outcome.output();
    // confidence defaults to 0.0, which is below the threshold.
    assert_eq!(out.confidence, 0.0);
    assert_eq!(out.document_type, DocumentType::Other);
    assert!(out.has_flag("low_confidence_override"));
    assert!(!out.is_continuation);
    assert_eq!(out.page_quality, PageQuality::Good);
}

#[tokio::test]
async fn unknown_label_fails_schema_validation() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 1), &RenderSettings::from(&config)).unwrap();
    let backend =
        Scripted::replying(r#"{"document_type":"invoice","confidence":0.97,"priority":"low"}"#);

    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    assert!(c.outcome.is_fallback());
    assert_eq!(c.outcome.output().flags, vec!["validation_error"]);
}

// ── Retry ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn server_errors_are_retried_within_budget() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 1), &RenderSettings::from(&config)).unwrap();
    let backend = Scripted::new(vec![
        Err(BackendError::from_message("503 Service Unavailable")),
        Err(BackendError::from_message("rate limit exceeded")),
        reply(r#"{"document_type":"pharmacy_request","confidence":0.93,"priority":"medium"}"#),
    ]);

    let c = classify_rendered(&backend, &rendered, &config).await.unwrap();
    assert_eq!(c.attempts, 3);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(c.outcome.output().document_type, DocumentType::PharmacyRequest);
}

#[tokio::test]
async fn exhausted_budget_is_transient_failure() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 1), &RenderSettings::from(&config)).unwrap();
    let backend = Scripted::new(vec![
        Err(BackendError::from_message("500 Internal Server Error")),
        Err(BackendError::from_message("500 Internal Server Error")),
        Err(BackendError::from_message("500 Internal Server Error")),
        reply(r#"{"document_type":"other","confidence":0.9}"#),
    ]);

    let err = classify_rendered(&backend, &rendered, &config).await.unwrap_err();
    assert!(matches!(err, TriageError::TransientFailure { attempts: 3, .. }));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn bad_request_is_not_retried() {
    let config = fast_config();
    let rendered =
        render_from_source(&FaxPages::new("x.pdf", 1), &RenderSettings::from(&config)).unwrap();
    let backend = Scripted::new(vec![Err(BackendError::from_message("400 Bad Request"))]);

    let result = block_on(classify_rendered(&backend, &rendered, &config));
    assert_err!(&result);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[test]
fn unreadable_inputs_become_error_rows() {
    let dir = tempfile::tempdir().unwrap();
    let not_pdf = dir.path().join("07_patient_records_request.pdf");
    std::fs::write(&not_pdf, b"<html>502 Bad Gateway</html>").unwrap();
    let missing = dir.path().join("99_not_in_corpus.pdf");

    let backend = Scripted::new(vec![]);
    let config = fast_config();
    let paths = vec![not_pdf, missing];
    let run = block_on(run_batch(&paths, &backend, &config, &GroundTruth::fax_corpus()));

    assert_eq!(run.records.len(), 2);
    assert_eq!(run.error_count(), 2);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

    let first = &run.records[0];
    assert_eq!(first.filename, "07_patient_records_request.pdf");
    assert_eq!(first.expected, "records_request");
    assert_eq!(first.actual, "error");
    assert_eq!(first.flags, vec!["processing_error"]);
    assert!(!first.matched);

    let second = &run.records[1];
    assert_eq!(second.expected, "unknown");
    assert!(second.error.as_deref().unwrap().contains("not found"));

    let artifact = run.to_artifact();
    assert_eq!(artifact.total_documents, 2);
    assert_eq!(artifact.correct_classifications, 0);
    assert_eq!(artifact.accuracy_percent, 0.0);
    assert_eq!(artifact.model, "scripted-vision");
}

#[tokio::test]
async fn transport_failure_becomes_error_row_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = [
        "01_lab_result_cbc.pdf",
        "08_junk_marketing_fax.pdf",
        "12_wrong_provider_misdirected.pdf",
    ]
    .iter()
    .map(|name| {
        let p = dir.path().join(name);
        std::fs::write(&p, b"%PDF-1.4\n%synthetic").unwrap();
        p
    })
    .collect();

    let backend = Scripted::new(vec![
        reply(r#"{"document_type":"lab_result","confidence":0.95,"priority":"high"}"#),
        reply("I could not determine the document type."),
        Err(BackendError::from_message("503 Service Unavailable")),
        Err(BackendError::from_message("503 Service Unavailable")),
        Err(BackendError::from_message("503 Service Unavailable")),
    ]);
    let run = run_batch_with(
        &paths,
        &SyntheticRenderer,
        &backend,
        &fast_config(),
        &GroundTruth::fax_corpus(),
    )
    .await;

    assert_eq!(run.records.len(), 3);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);

    assert_eq!(run.records[0].actual, "lab_result");
    assert!(run.records[0].matched);

    assert_eq!(run.records[1].actual, "other");
    assert_eq!(run.records[1].flags, vec!["json_parse_error"]);
    assert!(run.records[1].error.is_none());

    let failed = &run.records[2];
    assert_eq!(failed.actual, "error");
    assert_eq!(failed.flags, vec!["processing_error"]);
    assert!(failed.error.as_deref().unwrap().contains("3 attempts"));

    assert_eq!(run.error_count(), 1);
    assert_eq!(run.correct_count(), 1);
    assert_eq!(run.usage, TokenUsage::new(4200, 180) + TokenUsage::new(4200, 180));
}

#[test]
fn in_memory_non_pdf_bytes_are_rejected() {
    let backend = Scripted::new(vec![]);
    let err = block_on(classify_bytes(b"II*\0 tiff fax", &backend, &fast_config())).unwrap_err();
    assert!(matches!(err, TriageError::NotAPdf { .. }));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn saved_batch_round_trips_into_the_validator() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results/classification_results.json");
    let report_path = dir.path().join("results/validation_report.json");

    let bad = dir.path().join("08_junk_marketing_fax.pdf");
    std::fs::write(&bad, b"GIF89a").unwrap();
    let backend = Scripted::new(vec![]);
    let run = block_on(run_batch(
        &[bad],
        &backend,
        &fast_config(),
        &GroundTruth::fax_corpus(),
    ));
    assert_ok!(block_on(faxtriage::artifact::write_json(&results, &run.to_artifact())));

    let records = block_on(faxtriage::load_outcome_records(&results)).unwrap();
    assert_eq!(records.len(), 1);

    let mut validator = ClassificationValidator::new(GroundTruth::fax_corpus());
    validator.validate_records(&records).unwrap();
    let report = block_on(validator.save_report(&report_path)).unwrap();

    assert!(report_path.exists());
    assert_eq!(report.summary.total_documents, 1);
    assert_eq!(report.summary.correct_classifications, 0);
    assert_eq!(report.misclassifications.len(), 1);
    assert_eq!(report.misclassifications[0].actual, "error");
    assert_eq!(report.summary.standard_cases.total, 1);
    assert_eq!(report.summary.edge_cases.total, 0);
}

#[test]
fn empty_validator_reports_zero_metrics() {
    let validator = ClassificationValidator::new(GroundTruth::fax_corpus());
    let m = validator.calculate_metrics();
    assert_eq!(m.total_documents, 0);
    assert_eq!(m.accuracy_percent, 0.0);
    assert_eq!(m.edge_case_accuracy, 0.0);
    assert_eq!(m.standard_case_accuracy, 0.0);
}
