//! Scoring classifications against ground truth.
//!
//! [`ClassificationValidator`] is constructed with a [`GroundTruth`] table,
//! accumulates one [`ValidationResult`] per document, and derives
//! [`AccuracyMetrics`] on demand: overall, over the declared edge cases, and
//! over the remaining standard cases.

use crate::artifact::{read_json, write_json};
use crate::error::TriageError;
use crate::taxonomy::DocumentType;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// A document built to stress one failure mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCase {
    #[serde(rename = "type")]
    pub case_type: String,
    pub description: String,
    pub challenge: String,
    pub expected: DocumentType,
    #[serde(default)]
    pub flags_expected: Vec<String>,
}

/// Expected labels for a corpus, plus its edge-case registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub expected: BTreeMap<String, DocumentType>,
    #[serde(default)]
    pub edge_cases: BTreeMap<String, EdgeCase>,
}

impl GroundTruth {
    /// The 12-document synthetic fax corpus.
    pub fn fax_corpus() -> Self {
        use DocumentType::*;

        let expected = [
            ("01_lab_result_cbc.pdf", LabResult),
            ("02_referral_response_cardiology.pdf", ReferralResponse),
            ("03_prior_auth_approved.pdf", PriorAuthDecision),
            ("04_prior_auth_denied.pdf", PriorAuthDecision),
            ("05_pharmacy_refill_request.pdf", PharmacyRequest),
            ("06_insurance_correspondence.pdf", InsuranceCorrespondence),
            ("07_patient_records_request.pdf", RecordsRequest),
            ("08_junk_marketing_fax.pdf", MarketingJunk),
            ("09_orphan_cover_page.pdf", Other),
            ("10_chart_dump_40pages.pdf", Other),
            ("11_illegible_physician_notes.pdf", ReferralResponse),
            ("12_wrong_provider_misdirected.pdf", Other),
        ]
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect();

        let edge = |case_type: &str, description: &str, challenge: &str, flag: &str| EdgeCase {
            case_type: case_type.into(),
            description: description.into(),
            challenge: challenge.into(),
            expected: Other,
            flags_expected: vec![flag.into()],
        };

        let edge_cases = [
            (
                "09_orphan_cover_page.pdf",
                edge(
                    "orphan_cover_page",
                    "Fax cover sheet with no attached content pages",
                    "Classifier must detect incomplete document",
                    "incomplete_document",
                ),
            ),
            (
                "10_chart_dump_40pages.pdf",
                edge(
                    "multi_document_bundle",
                    "40-page patient chart containing multiple document types",
                    "Classifier must detect multi-type bundle",
                    "multi_document_bundle",
                ),
            ),
            (
                "12_wrong_provider_misdirected.pdf",
                edge(
                    "misdirected",
                    "Fax clearly addressed to different provider/practice",
                    "Classifier must detect wrong recipient",
                    "possibly_misdirected",
                ),
            ),
        ]
        .into_iter()
        .map(|(name, case)| (name.to_string(), case))
        .collect();

        Self {
            expected,
            edge_cases,
        }
    }

    /// Load `{"expected": {...}, "edge_cases": {...}}` from disk.
    pub async fn from_json_file(path: &Path) -> Result<Self, TriageError> {
        read_json(path).await
    }

    pub fn expected_for(&self, filename: &str) -> Option<DocumentType> {
        self.expected.get(filename).copied()
    }

    pub fn edge_case(&self, filename: &str) -> Option<&EdgeCase> {
        self.edge_cases.get(filename)
    }

    pub fn len(&self) -> usize {
        self.expected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// One scored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub filename: String,
    pub expected: DocumentType,
    /// A document type, or a marker such as `error` for failed documents.
    pub actual: String,
    pub is_edge_case: bool,
    pub edge_case_type: Option<String>,
    pub correct: bool,
    pub confidence: f64,
    pub priority: String,
    pub flags: Vec<String>,
    pub notes: Option<String>,
}

/// A raw per-document outcome as found in a batch artifact.
///
/// Every field is optional so artifacts from older or partial runs load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub flags: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    List(Vec<OutcomeRecord>),
    Wrapped { results: Vec<OutcomeRecord> },
}

/// Load outcome records from a bare list or a `{"results": [...]}` artifact.
pub async fn load_outcome_records(path: &Path) -> Result<Vec<OutcomeRecord>, TriageError> {
    let records = match read_json::<RecordsFile>(path).await? {
        RecordsFile::List(records) => records,
        RecordsFile::Wrapped { results } => results,
    };
    debug!("Loaded {} outcome record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Counts and percentages over the accumulated results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub total_documents: usize,
    pub correct_classifications: usize,
    pub accuracy_percent: f64,
    pub edge_cases_total: usize,
    pub edge_cases_correct: usize,
    pub edge_case_accuracy: f64,
    pub standard_cases_total: usize,
    pub standard_cases_correct: usize,
    pub standard_case_accuracy: f64,
}

fn percent(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetSummary {
    pub total: usize,
    pub correct: usize,
    pub accuracy_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_documents: usize,
    pub correct_classifications: usize,
    pub accuracy_percent: f64,
    pub edge_cases: SubsetSummary,
    pub standard_cases: SubsetSummary,
}

impl From<&AccuracyMetrics> for ReportSummary {
    fn from(m: &AccuracyMetrics) -> Self {
        Self {
            total_documents: m.total_documents,
            correct_classifications: m.correct_classifications,
            accuracy_percent: round_to(m.accuracy_percent, 1),
            edge_cases: SubsetSummary {
                total: m.edge_cases_total,
                correct: m.edge_cases_correct,
                accuracy_percent: round_to(m.edge_case_accuracy, 1),
            },
            standard_cases: SubsetSummary {
                total: m.standard_cases_total,
                correct: m.standard_cases_correct,
                accuracy_percent: round_to(m.standard_case_accuracy, 1),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Misclassification {
    pub filename: String,
    pub expected: DocumentType,
    pub actual: String,
    pub is_edge_case: bool,
    pub edge_case_type: Option<String>,
    pub confidence: f64,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCaseDetail {
    pub filename: String,
    #[serde(rename = "type")]
    pub case_type: Option<String>,
    pub expected: DocumentType,
    pub actual: String,
    pub correct: bool,
    pub confidence: f64,
    pub flags: Vec<String>,
    pub description: Option<String>,
    pub challenge: Option<String>,
}

/// The terminal artifact of a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Local>,
    pub summary: ReportSummary,
    pub misclassifications: Vec<Misclassification>,
    pub edge_case_details: Vec<EdgeCaseDetail>,
    pub all_results: Vec<ValidationResult>,
}

/// Accumulates scored documents against one ground-truth table.
#[derive(Debug, Clone)]
pub struct ClassificationValidator {
    ground_truth: GroundTruth,
    results: Vec<ValidationResult>,
}

impl ClassificationValidator {
    pub fn new(ground_truth: GroundTruth) -> Self {
        Self {
            ground_truth,
            results: Vec::new(),
        }
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        &self.ground_truth
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    /// Score one document and record the result.
    pub fn validate(
        &mut self,
        filename: &str,
        actual: &str,
        confidence: f64,
        priority: &str,
        flags: Vec<String>,
        notes: Option<String>,
    ) -> Result<ValidationResult, TriageError> {
        let expected =
            self.ground_truth
                .expected_for(filename)
                .ok_or_else(|| TriageError::UnknownDocument {
                    filename: filename.to_string(),
                })?;
        let edge_case_type = self
            .ground_truth
            .edge_case(filename)
            .map(|e| e.case_type.clone());

        let result = ValidationResult {
            filename: filename.to_string(),
            expected,
            actual: actual.to_string(),
            is_edge_case: edge_case_type.is_some(),
            edge_case_type,
            correct: actual == expected.as_str(),
            confidence,
            priority: priority.to_string(),
            flags,
            notes,
        };
        debug!(
            "{}: expected {}, got {} ({})",
            result.filename,
            result.expected,
            result.actual,
            if result.correct { "ok" } else { "MISS" }
        );

        self.results.push(result.clone());
        Ok(result)
    }

    /// Score a sequence of raw outcome records, skipping any without a filename.
    pub fn validate_records(
        &mut self,
        records: &[OutcomeRecord],
    ) -> Result<Vec<ValidationResult>, TriageError> {
        let mut validated = Vec::with_capacity(records.len());
        for record in records {
            let Some(filename) = record.filename.as_deref().filter(|f| !f.is_empty()) else {
                continue;
            };
            validated.push(self.validate(
                filename,
                record.actual.as_deref().unwrap_or("unknown"),
                record.confidence.unwrap_or(0.0),
                record.priority.as_deref().unwrap_or("none"),
                record.flags.clone().unwrap_or_default(),
                record.error.clone(),
            )?);
        }
        Ok(validated)
    }

    pub fn calculate_metrics(&self) -> AccuracyMetrics {
        if self.results.is_empty() {
            return AccuracyMetrics::default();
        }

        let (edge, standard): (Vec<&ValidationResult>, Vec<&ValidationResult>) =
            self.results.iter().partition(|r| r.is_edge_case);
        let correct = |rs: &[&ValidationResult]| rs.iter().filter(|r| r.correct).count();

        let total = self.results.len();
        let total_correct = self.results.iter().filter(|r| r.correct).count();
        let edge_correct = correct(&edge);
        let standard_correct = correct(&standard);

        AccuracyMetrics {
            total_documents: total,
            correct_classifications: total_correct,
            accuracy_percent: percent(total_correct, total),
            edge_cases_total: edge.len(),
            edge_cases_correct: edge_correct,
            edge_case_accuracy: percent(edge_correct, edge.len()),
            standard_cases_total: standard.len(),
            standard_cases_correct: standard_correct,
            standard_case_accuracy: percent(standard_correct, standard.len()),
        }
    }

    pub fn get_misclassifications(&self) -> Vec<&ValidationResult> {
        self.results.iter().filter(|r| !r.correct).collect()
    }

    pub fn get_edge_case_results(&self) -> Vec<&ValidationResult> {
        self.results.iter().filter(|r| r.is_edge_case).collect()
    }

    pub fn generate_report(&self) -> ValidationReport {
        let metrics = self.calculate_metrics();

        let misclassifications = self
            .get_misclassifications()
            .into_iter()
            .map(|r| Misclassification {
                filename: r.filename.clone(),
                expected: r.expected,
                actual: r.actual.clone(),
                is_edge_case: r.is_edge_case,
                edge_case_type: r.edge_case_type.clone(),
                confidence: r.confidence,
                flags: r.flags.clone(),
            })
            .collect();

        let edge_case_details = self
            .get_edge_case_results()
            .into_iter()
            .map(|r| {
                let case = self.ground_truth.edge_case(&r.filename);
                EdgeCaseDetail {
                    filename: r.filename.clone(),
                    case_type: r.edge_case_type.clone(),
                    expected: r.expected,
                    actual: r.actual.clone(),
                    correct: r.correct,
                    confidence: r.confidence,
                    flags: r.flags.clone(),
                    description: case.map(|c| c.description.clone()),
                    challenge: case.map(|c| c.challenge.clone()),
                }
            })
            .collect();

        ValidationReport {
            timestamp: Local::now(),
            summary: ReportSummary::from(&metrics),
            misclassifications,
            edge_case_details,
            all_results: self.results.clone(),
        }
    }

    /// Write [`Self::generate_report`] to `path` atomically.
    pub async fn save_report(&self, path: &Path) -> Result<ValidationReport, TriageError> {
        let report = self.generate_report();
        write_json(path, &report).await?;
        info!("Validation report saved to {}", path.display());
        Ok(report)
    }

    /// Plain-text comparison table, sorted by filename.
    pub fn comparison_table(&self) -> String {
        let rule = |c: char| c.to_string().repeat(130);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule('='));
        let _ = writeln!(
            out,
            "{:<40} {:<24} {:<24} {:<6} {:<6} {:<22} Flags",
            "Filename", "Expected", "Actual", "Match", "Conf", "Edge Case"
        );
        let _ = writeln!(out, "{}", rule('-'));

        let mut sorted: Vec<&ValidationResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.filename.cmp(&b.filename));
        for r in sorted {
            let flags = if r.flags.is_empty() {
                "-".to_string()
            } else {
                r.flags.iter().take(2).cloned().collect::<Vec<_>>().join(", ")
            };
            let _ = writeln!(
                out,
                "{:<40} {:<24} {:<24} {:<6} {:<6.2} {:<22} {}",
                r.filename,
                r.expected.as_str(),
                r.actual,
                if r.correct { "✓" } else { "✗" },
                r.confidence,
                r.edge_case_type.as_deref().unwrap_or("-"),
                flags
            );
        }
        let _ = write!(out, "{}", rule('-'));
        out
    }
}
