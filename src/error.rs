//! Error types for the faxtriage library.
//!
//! Three distinct types reflect three distinct failure modes:
//!
//! * [`TriageError`]: **Fatal for one document or one call**: the input is
//!   unreadable, the transport failed after its retry budget, or a filename
//!   has no ground truth. Returned as `Err(TriageError)`. The batch driver
//!   turns per-document instances into error rows instead of aborting.
//!
//! * [`FallbackReason`]: **Never propagated**: the classifier answered but
//!   the reply could not be trusted (not JSON, or JSON that breaks the output
//!   schema). Carried inside
//!   [`crate::taxonomy::ClassificationOutcome::Fallback`] next to a safe
//!   `other` / 0.0-confidence result.
//!
//! * [`SchemaViolation`]: the precise rule a parsed reply broke; wrapped by
//!   [`FallbackReason::SchemaValidation`].

use crate::pipeline::retry::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the faxtriage library.
#[derive(Debug, Error)]
pub enum TriageError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// A directory scan was requested on something that is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    // ── Source decode errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but contains no pages.
    #[error("PDF '{path}' contains no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium (or the PNG encoder) failed on a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Bytes handed to the quality analyzer are not a decodable image.
    #[error("Image could not be decoded: {detail}")]
    ImageDecode { detail: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// A retryable failure persisted through every attempt.
    #[error("Classifier call failed after {attempts} attempts ({kind}): {detail}")]
    TransientFailure {
        kind: FailureKind,
        attempts: u32,
        detail: String,
    },

    /// A failure that retrying cannot fix (bad key, malformed request).
    #[error("Classifier call rejected ({kind}): {detail}")]
    TransportFatal { kind: FailureKind, detail: String },

    // ── Configuration errors ──────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library in the working directory."
    )]
    PdfiumBindingFailed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Validation errors ─────────────────────────────────────────────────
    /// The filename has no entry in the ground-truth table.
    #[error("No expected classification for '{filename}'")]
    UnknownDocument { filename: String },

    // ── Artifact I/O errors ───────────────────────────────────────────────
    /// Could not read a persisted artifact.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not JSON of the expected shape.
    #[error("Unexpected artifact format in '{path}': {detail}")]
    InvalidArtifact { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TriageError {
    /// True for unreadable input: the document itself cannot be classified.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            TriageError::FileNotFound { .. }
                | TriageError::PermissionDenied { .. }
                | TriageError::NotAPdf { .. }
                | TriageError::CorruptPdf { .. }
                | TriageError::PasswordRequired { .. }
                | TriageError::WrongPassword { .. }
                | TriageError::EmptyDocument { .. }
                | TriageError::RasterisationFailed { .. }
                | TriageError::ImageDecode { .. }
        )
    }

    /// True when the classifier call itself failed.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            TriageError::TransientFailure { .. } | TriageError::TransportFatal { .. }
        )
    }
}

/// Why a classifier reply was replaced by the safe fallback result.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FallbackReason {
    /// The cleaned reply text is not JSON.
    #[error("reply is not valid JSON: {0}")]
    JsonParse(String),

    /// The reply is JSON but violates the output schema.
    #[error("reply violates the output schema: {0}")]
    SchemaValidation(String),
}

impl FallbackReason {
    /// Flag stamped on the fallback output so downstream consumers can filter.
    pub fn flag(&self) -> &'static str {
        match self {
            FallbackReason::JsonParse(_) => "json_parse_error",
            FallbackReason::SchemaValidation(_) => "validation_error",
        }
    }
}

/// A single broken rule of the classifier output schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaViolation {
    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("field '{field}' has unknown value '{value}'")]
    NotInEnum { field: &'static str, value: String },

    #[error("field '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failure_display() {
        let e = TriageError::TransientFailure {
            kind: FailureKind::RateLimited,
            attempts: 3,
            detail: "429 Too Many Requests".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("rate_limited"), "got: {msg}");
        assert!(e.is_transport_error());
        assert!(!e.is_source_error());
    }

    #[test]
    fn unknown_document_display() {
        let e = TriageError::UnknownDocument {
            filename: "99_mystery.pdf".into(),
        };
        assert!(e.to_string().contains("99_mystery.pdf"));
    }

    #[test]
    fn corrupt_pdf_is_source_error() {
        let e = TriageError::CorruptPdf {
            path: PathBuf::from("bad.pdf"),
            detail: "xref".into(),
        };
        assert!(e.is_source_error());
        assert!(!e.is_transport_error());
    }

    #[test]
    fn fallback_reason_flags() {
        assert_eq!(
            FallbackReason::JsonParse("eof".into()).flag(),
            "json_parse_error"
        );
        assert_eq!(
            FallbackReason::SchemaValidation("x".into()).flag(),
            "validation_error"
        );
    }

    #[test]
    fn schema_violation_display() {
        let v = SchemaViolation::NotInEnum {
            field: "priority",
            value: "asap".into(),
        };
        assert_eq!(v.to_string(), "field 'priority' has unknown value 'asap'");
    }
}
