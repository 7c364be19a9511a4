//! Batch driver: classify documents one at a time and collect one row each.
//!
//! Documents are processed strictly in the given order. A document that
//! cannot be rendered or whose classifier call fails after retries becomes an
//! error row (`actual = "error"`, flag `processing_error`); the batch always
//! has exactly one row per input path.

use crate::config::ClassifierConfig;
use crate::error::TriageError;
use crate::pipeline::input::{collect_pdfs, file_name_of, resolve_input};
use crate::pipeline::llm::{classify_rendered, Classification, ClassifierBackend};
use crate::pipeline::render::{DocumentRenderer, PdfiumRenderer};
use crate::taxonomy::{ClassificationOutcome, ExtractedFields};
use crate::usage::{Pricing, TokenUsage, TokenUsageReport};
use crate::validation::{round_to, GroundTruth};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

pub const ERROR_LABEL: &str = "error";
pub const PROCESSING_ERROR_FLAG: &str = "processing_error";
/// Expected label for files missing from the ground truth.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Render and classify one PDF on disk.
pub async fn classify_file(
    path: &Path,
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
) -> Result<Classification, TriageError> {
    classify_document(path, &PdfiumRenderer, backend, config).await
}

/// [`classify_file`] with an explicit renderer.
pub async fn classify_document(
    path: &Path,
    renderer: &dyn DocumentRenderer,
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
) -> Result<Classification, TriageError> {
    let path = resolve_input(path)?;
    let rendered = renderer.render(&path, config).await?;
    info!(
        "{}: {}/{} page(s) rendered, quality {}",
        path.display(),
        rendered.pages_processed_count,
        rendered.total_page_count,
        rendered.overall_quality
    );
    classify_rendered(backend, &rendered, config).await
}

/// Classify PDF bytes held in memory.
///
/// The bytes go to a managed temp file that is removed on return.
pub async fn classify_bytes(
    bytes: &[u8],
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
) -> Result<Classification, TriageError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| TriageError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| TriageError::Internal(format!("tempfile write: {e}")))?;

    classify_file(tmp.path(), backend, config).await
}

/// One row of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub filename: String,
    /// Ground-truth label, or `unknown`.
    pub expected: String,
    /// Final label, or `error`.
    pub actual: String,
    #[serde(rename = "match")]
    pub matched: bool,
    pub confidence: f64,
    pub priority: String,
    /// Seconds spent on this document.
    pub processing_time: f64,
    pub flags: Vec<String>,
    pub extracted_fields: ExtractedFields,
    /// The final output, plus `parse_error` / `raw_response` for fallbacks.
    pub api_response: Value,
    pub error: Option<String>,
}

impl ClassificationRecord {
    fn from_classification(
        filename: String,
        expected: &str,
        classification: &Classification,
        seconds: f64,
    ) -> Self {
        let output = classification.outcome.output();
        let mut api_response = serde_json::to_value(output).unwrap_or(Value::Null);
        if let (
            ClassificationOutcome::Fallback {
                reason,
                raw_preview,
                ..
            },
            Value::Object(map),
        ) = (&classification.outcome, &mut api_response)
        {
            map.insert("parse_error".into(), Value::from(reason.to_string()));
            map.insert("raw_response".into(), Value::from(raw_preview.as_str()));
        }

        let actual = output.document_type.as_str();
        Self {
            filename,
            expected: expected.to_string(),
            actual: actual.to_string(),
            matched: actual == expected,
            confidence: output.confidence,
            priority: output.priority.as_str().to_string(),
            processing_time: round_to(seconds, 2),
            flags: output.flags.clone(),
            extracted_fields: output.extracted_fields.clone(),
            api_response,
            error: None,
        }
    }

    fn from_error(filename: String, expected: &str, error: &TriageError, seconds: f64) -> Self {
        Self {
            filename,
            expected: expected.to_string(),
            actual: ERROR_LABEL.to_string(),
            matched: false,
            confidence: 0.0,
            priority: "none".to_string(),
            processing_time: round_to(seconds, 2),
            flags: vec![PROCESSING_ERROR_FLAG.to_string()],
            extracted_fields: ExtractedFields::default(),
            api_response: json!({}),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything a batch produced, in input order.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub timestamp: DateTime<Local>,
    pub model: String,
    pub records: Vec<ClassificationRecord>,
    pub usage: TokenUsage,
    pub pricing: Pricing,
}

/// The persisted form of a [`BatchRun`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchArtifact {
    pub timestamp: DateTime<Local>,
    pub model: String,
    pub total_documents: usize,
    pub correct_classifications: usize,
    pub accuracy_percent: f64,
    pub token_usage: TokenUsageReport,
    pub results: Vec<ClassificationRecord>,
}

impl BatchRun {
    pub fn correct_count(&self) -> usize {
        self.records.iter().filter(|r| r.matched).count()
    }

    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_error()).count()
    }

    pub fn accuracy_percent(&self) -> f64 {
        if self.records.is_empty() {
            0.0
        } else {
            self.correct_count() as f64 / self.records.len() as f64 * 100.0
        }
    }

    pub fn to_artifact(&self) -> BatchArtifact {
        BatchArtifact {
            timestamp: self.timestamp,
            model: self.model.clone(),
            total_documents: self.records.len(),
            correct_classifications: self.correct_count(),
            accuracy_percent: round_to(self.accuracy_percent(), 1),
            token_usage: TokenUsageReport::new(self.usage, &self.pricing),
            results: self.records.clone(),
        }
    }
}

/// Classify `paths` in order, one row per path.
pub async fn run_batch(
    paths: &[PathBuf],
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
    ground_truth: &GroundTruth,
) -> BatchRun {
    run_batch_with(paths, &PdfiumRenderer, backend, config, ground_truth).await
}

/// [`run_batch`] with an explicit renderer.
pub async fn run_batch_with(
    paths: &[PathBuf],
    renderer: &dyn DocumentRenderer,
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
    ground_truth: &GroundTruth,
) -> BatchRun {
    let total = paths.len();
    let callback = config.progress_callback.as_ref();
    info!("Classifying {} document(s) with {}", total, backend.model_name());
    if let Some(cb) = callback {
        cb.on_batch_start(total);
    }

    let mut records = Vec::with_capacity(total);
    let mut usage = TokenUsage::default();

    for (i, path) in paths.iter().enumerate() {
        let index = i + 1;
        let filename = file_name_of(path);
        let expected = ground_truth
            .expected_for(&filename)
            .map(|t| t.as_str())
            .unwrap_or(UNKNOWN_LABEL);
        if let Some(cb) = callback {
            cb.on_document_start(index, total, &filename);
        }

        let start = Instant::now();
        let result = classify_document(path, renderer, backend, config).await;
        let seconds = start.elapsed().as_secs_f64();

        let record = match result {
            Ok(classification) => {
                usage += classification.usage;
                let record = ClassificationRecord::from_classification(
                    filename.clone(),
                    expected,
                    &classification,
                    seconds,
                );
                info!(
                    "[{}/{}] {}: {} (confidence {:.2}, expected {})",
                    index, total, filename, record.actual, record.confidence, expected
                );
                if let Some(cb) = callback {
                    cb.on_document_complete(index, total, &filename, &record.actual);
                }
                record
            }
            Err(e) => {
                warn!("[{}/{}] {}: {}", index, total, filename, e);
                if let Some(cb) = callback {
                    cb.on_document_error(index, total, &filename, &e.to_string());
                }
                ClassificationRecord::from_error(filename.clone(), expected, &e, seconds)
            }
        };
        records.push(record);
    }

    let run = BatchRun {
        timestamp: Local::now(),
        model: backend.model_name(),
        records,
        usage,
        pricing: config.pricing,
    };
    info!(
        "Batch complete: {}/{} correct, {} error(s), {} tokens",
        run.correct_count(),
        total,
        run.error_count(),
        run.usage.total_tokens()
    );
    if let Some(cb) = callback {
        cb.on_batch_complete(total, run.error_count());
    }
    run
}

/// [`run_batch`] over every PDF in `dir`.
pub async fn classify_directory(
    dir: &Path,
    backend: &dyn ClassifierBackend,
    config: &ClassifierConfig,
    ground_truth: &GroundTruth,
) -> Result<BatchRun, TriageError> {
    let paths = collect_pdfs(dir)?;
    Ok(run_batch(&paths, backend, config, ground_truth).await)
}
