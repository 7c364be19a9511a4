//! Turning a raw classifier reply into a trusted [`ClassificationOutcome`].
//!
//! The reply is untrusted text. It goes through five steps, in order:
//!
//! 1. strip surrounding code fences
//! 2. parse as JSON; failure → fallback (`json_parse_error`)
//! 3. fill missing optional fields with defaults, then stamp
//!    `page_count_processed` / `page_quality` from the render stage
//! 4. check the record against the output schema; failure → fallback
//!    (`validation_error`)
//! 5. clamp: confidence below the threshold forces `other`
//!
//! Nothing here returns an error. An untrustworthy reply becomes a fallback
//! outcome carrying its reason and a bounded preview of the raw text.

use crate::error::{FallbackReason, SchemaViolation};
use crate::taxonomy::{
    ClassificationOutcome, ClassificationOutput, DocumentType, PageQuality, Priority,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{info, warn};

pub const LOW_CONFIDENCE_FLAG: &str = "low_confidence_override";

static RE_LEADING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z]*").unwrap());
static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

/// Remove an optional leading ```` ```json ```` (or bare ```` ``` ````) and
/// trailing ```` ``` ````.
pub fn strip_code_fences(raw: &str) -> String {
    let s = raw.trim();
    let s = RE_LEADING_FENCE.replace(s, "");
    let s = RE_TRAILING_FENCE.replace(s.trim(), "");
    s.trim().to_string()
}

/// First `max_chars` characters of the raw reply.
pub fn raw_preview(raw: &str, max_chars: usize) -> String {
    raw.chars().take(max_chars).collect()
}

/// Insert documented defaults for absent optional fields.
pub fn fill_defaults(obj: &mut Map<String, Value>) {
    let defaults = [
        ("confidence", Value::from(0.0)),
        ("priority", Value::from(Priority::None.as_str())),
        ("extracted_fields", Value::Object(Map::new())),
        ("is_continuation", Value::Bool(false)),
        ("flags", Value::Array(Vec::new())),
    ];
    for (key, value) in defaults {
        obj.entry(key).or_insert(value);
    }
}

/// Overwrite the locally known fields, whatever the model echoed.
pub fn stamp_computed(obj: &mut Map<String, Value>, pages: usize, quality: PageQuality) {
    obj.insert("page_count_processed".into(), Value::from(pages as u64));
    obj.insert("page_quality".into(), Value::from(quality.as_str()));
}

fn enum_field<T: FromStr>(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<(), SchemaViolation> {
    match obj.get(field) {
        None => Err(SchemaViolation::MissingField(field)),
        Some(Value::String(s)) => s.parse::<T>().map(|_| ()).map_err(|_| {
            SchemaViolation::NotInEnum {
                field,
                value: s.clone(),
            }
        }),
        Some(_) => Err(SchemaViolation::WrongType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

fn string_list(value: &Value, field: String) -> Result<(), SchemaViolation> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
        _ => Err(SchemaViolation::WrongType {
            field,
            expected: "an array of strings",
        }),
    }
}

const NULLABLE_TEXT_FIELDS: [&str; 7] = [
    "patient_name",
    "patient_dob",
    "sending_provider",
    "sending_facility",
    "document_date",
    "fax_origin_number",
    "key_details",
];

fn extracted_fields(value: &Value) -> Result<(), SchemaViolation> {
    let fields = value.as_object().ok_or(SchemaViolation::WrongType {
        field: "extracted_fields".into(),
        expected: "an object",
    })?;
    for name in NULLABLE_TEXT_FIELDS {
        match fields.get(name) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(_) => {
                return Err(SchemaViolation::WrongType {
                    field: format!("extracted_fields.{name}"),
                    expected: "a string or null",
                })
            }
        }
    }
    match fields.get("urgency_indicators") {
        None | Some(Value::Null) => Ok(()),
        Some(v) => string_list(v, "extracted_fields.urgency_indicators".into()),
    }
}

/// Check a filled, stamped record against the output schema.
///
/// `document_type` is required; every other field is expected to have been
/// defaulted by [`fill_defaults`]. Unknown keys are ignored.
pub fn validate_schema(value: &Value) -> Result<(), SchemaViolation> {
    let obj = value.as_object().ok_or(SchemaViolation::NotAnObject)?;

    enum_field::<DocumentType>(obj, "document_type")?;
    enum_field::<Priority>(obj, "priority")?;
    enum_field::<PageQuality>(obj, "page_quality")?;

    let confidence = obj
        .get("confidence")
        .ok_or(SchemaViolation::MissingField("confidence"))?
        .as_f64()
        .ok_or(SchemaViolation::WrongType {
            field: "confidence".into(),
            expected: "a number",
        })?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(SchemaViolation::OutOfRange {
            field: "confidence",
            value: confidence,
        });
    }

    extracted_fields(
        obj.get("extracted_fields")
            .ok_or(SchemaViolation::MissingField("extracted_fields"))?,
    )?;

    if !obj.get("is_continuation").is_some_and(Value::is_boolean) {
        return Err(SchemaViolation::WrongType {
            field: "is_continuation".into(),
            expected: "a boolean",
        });
    }
    if !obj.get("page_count_processed").is_some_and(Value::is_u64) {
        return Err(SchemaViolation::WrongType {
            field: "page_count_processed".into(),
            expected: "a non-negative integer",
        });
    }
    string_list(
        obj.get("flags").ok_or(SchemaViolation::MissingField("flags"))?,
        "flags".into(),
    )
}

/// Steps 1–4: the schema-validated output, before the confidence clamp.
pub fn validate_reply(
    raw: &str,
    pages: usize,
    quality: PageQuality,
) -> Result<ClassificationOutput, FallbackReason> {
    let cleaned = strip_code_fences(raw);
    let mut value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| FallbackReason::JsonParse(e.to_string()))?;

    if let Value::Object(ref mut obj) = value {
        fill_defaults(obj);
        stamp_computed(obj, pages, quality);
    }

    validate_schema(&value).map_err(|v| FallbackReason::SchemaValidation(v.to_string()))?;

    serde_json::from_value(value).map_err(|e| FallbackReason::SchemaValidation(e.to_string()))
}

/// Step 5: below `threshold`, the label becomes `other`.
///
/// Idempotent: the override flag is added at most once.
pub fn apply_confidence_clamp(
    mut output: ClassificationOutput,
    threshold: f64,
) -> ClassificationOutput {
    if output.confidence < threshold && output.document_type != DocumentType::Other {
        info!(
            "Confidence {:.2} below {:.2}: {} → other",
            output.confidence, threshold, output.document_type
        );
        output.document_type = DocumentType::Other;
        if !output.has_flag(LOW_CONFIDENCE_FLAG) {
            output.flags.push(LOW_CONFIDENCE_FLAG.to_string());
        }
    }
    output
}

/// The full pipeline for one reply.
pub fn interpret_reply(
    raw: &str,
    pages: usize,
    quality: PageQuality,
    threshold: f64,
    preview_chars: usize,
) -> ClassificationOutcome {
    match validate_reply(raw, pages, quality) {
        Ok(output) => ClassificationOutcome::Validated {
            output: apply_confidence_clamp(output, threshold),
        },
        Err(reason) => {
            warn!("Falling back to 'other': {}", reason);
            ClassificationOutcome::Fallback {
                output: ClassificationOutput::fallback(&reason, pages, quality),
                reason,
                raw_preview: raw_preview(raw, preview_chars),
            }
        }
    }
}
