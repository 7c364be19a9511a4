//! # faxtriage
//!
//! Classify scanned medical-office faxes with a vision language model and
//! score the results against ground truth.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate path, %PDF magic
//!  ├─ 2. Render    rasterise the capped page prefix via pdfium (spawn_blocking)
//!  ├─ 3. Quality   brightness / contrast per page → good | fair | poor, blank
//!  ├─ 4. Request   instruction block + page PNGs in order
//!  ├─ 5. Classify  provider call with bounded exponential backoff
//!  ├─ 6. Response  fences → JSON → defaults → schema → confidence clamp
//!  └─ 7. Validate  compare with ground truth, accuracy over edge/standard cases
//! ```
//!
//! A reply that is not JSON, or JSON that breaks the output schema, never
//! aborts anything: it becomes a fallback classification (`other`, confidence
//! 0.0) flagged with the reason. Only unreadable documents and transport
//! failures that outlast the retry budget are errors, and the batch driver
//! records those as error rows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faxtriage::{classify_directory, ClassificationValidator, ClassifierConfig, GroundTruth, LlmBackend};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let config = ClassifierConfig::default();
//!     let backend = LlmBackend::from_config(&config)?;
//!     let truth = GroundTruth::fax_corpus();
//!
//!     let run = classify_directory(Path::new("test_cases"), &backend, &config, &truth).await?;
//!     eprintln!("{}/{} correct", run.correct_count(), run.records.len());
//!
//!     let mut validator = ClassificationValidator::new(truth);
//!     for r in run.records.iter().filter(|r| r.expected != "unknown") {
//!         validator.validate(&r.filename, &r.actual, r.confidence, &r.priority, r.flags.clone(), r.error.clone())?;
//!     }
//!     println!("{:.1}%", validator.calculate_metrics().accuracy_percent);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `faxtriage` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod taxonomy;
pub mod usage;
pub mod validation;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    classify_bytes, classify_directory, classify_document, classify_file, run_batch,
    run_batch_with, BatchArtifact, BatchRun, ClassificationRecord,
};
pub use config::{ClassifierConfig, ClassifierConfigBuilder, PageCapPolicy};
pub use error::{FallbackReason, SchemaViolation, TriageError};
pub use pipeline::llm::{
    classify_rendered, BackendReply, Classification, ClassifierBackend, LlmBackend,
};
pub use pipeline::quality::{PageAnalysis, QualityThresholds};
pub use pipeline::render::{
    render_from_source, DocumentRenderResult, DocumentRenderer, PageSource, PdfiumRenderer,
};
pub use pipeline::retry::{BackendError, FailureKind, RetryPolicy};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use taxonomy::{
    ClassificationOutcome, ClassificationOutput, DocumentType, ExtractedFields, PageQuality,
    Priority,
};
pub use usage::{Pricing, TokenUsage, TokenUsageReport};
pub use validation::{
    load_outcome_records, AccuracyMetrics, ClassificationValidator, EdgeCase, GroundTruth,
    OutcomeRecord, ValidationReport, ValidationResult,
};
