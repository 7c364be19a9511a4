//! The fixed document taxonomy and the typed classifier output.
//!
//! Every enum serialises to the exact snake_case strings the classifier is
//! instructed to emit (see [`crate::prompts`]), so the same types describe
//! the wire contract, the persisted artifacts, and the in-memory results.

use crate::error::FallbackReason;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight medical-office document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    LabResult,
    ReferralResponse,
    PriorAuthDecision,
    PharmacyRequest,
    InsuranceCorrespondence,
    RecordsRequest,
    MarketingJunk,
    /// Catch-all: orphan cover sheets, misdirected faxes, bundles, illegible
    /// pages, and anything classified below the confidence threshold.
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::LabResult,
        DocumentType::ReferralResponse,
        DocumentType::PriorAuthDecision,
        DocumentType::PharmacyRequest,
        DocumentType::InsuranceCorrespondence,
        DocumentType::RecordsRequest,
        DocumentType::MarketingJunk,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::LabResult => "lab_result",
            DocumentType::ReferralResponse => "referral_response",
            DocumentType::PriorAuthDecision => "prior_auth_decision",
            DocumentType::PharmacyRequest => "pharmacy_request",
            DocumentType::InsuranceCorrespondence => "insurance_correspondence",
            DocumentType::RecordsRequest => "records_request",
            DocumentType::MarketingJunk => "marketing_junk",
            DocumentType::Other => "other",
        }
    }
}

/// Urgency bucket assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    /// Marketing and anything needing no action.
    #[default]
    None,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::None => "none",
        }
    }
}

/// Coarse pixel-statistics quality bucket for a page or a whole document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageQuality {
    Good,
    Fair,
    Poor,
}

impl PageQuality {
    pub const ALL: [PageQuality; 3] = [PageQuality::Good, PageQuality::Fair, PageQuality::Poor];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageQuality::Good => "good",
            PageQuality::Fair => "fair",
            PageQuality::Poor => "poor",
        }
    }
}

macro_rules! str_enum_impls {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {} '{}'", $what, s))
            }
        }
    };
}

str_enum_impls!(DocumentType, "document type");
str_enum_impls!(Priority, "priority");
str_enum_impls!(PageQuality, "page quality");

/// Metadata the classifier pulls off the fax. Unknown values stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub patient_name: Option<String>,
    /// `YYYY-MM-DD` when known.
    #[serde(default)]
    pub patient_dob: Option<String>,
    #[serde(default)]
    pub sending_provider: Option<String>,
    #[serde(default)]
    pub sending_facility: Option<String>,
    #[serde(default)]
    pub document_date: Option<String>,
    #[serde(default)]
    pub fax_origin_number: Option<String>,
    /// Verbatim markers such as "STAT", "CRITICAL VALUE", "DENIED".
    #[serde(default, deserialize_with = "null_as_default")]
    pub urgency_indicators: Vec<String>,
    /// Free-text summary of the document.
    #[serde(default)]
    pub key_details: Option<String>,
}

/// One classification, either validated or substituted by the fallback.
///
/// Invariant: `confidence < threshold` implies `document_type == Other`
/// once the output leaves [`crate::pipeline::response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub priority: Priority,
    #[serde(default)]
    pub extracted_fields: ExtractedFields,
    #[serde(default)]
    pub is_continuation: bool,
    pub page_count_processed: usize,
    pub page_quality: PageQuality,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl ClassificationOutput {
    /// The safe result substituted for an untrustworthy reply.
    pub fn fallback(reason: &FallbackReason, pages: usize, quality: PageQuality) -> Self {
        Self {
            document_type: DocumentType::Other,
            confidence: 0.0,
            priority: Priority::None,
            extracted_fields: ExtractedFields::default(),
            is_continuation: false,
            page_count_processed: pages,
            page_quality: quality,
            flags: vec![reason.flag().to_string()],
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Result of the response pipeline: a trusted output or a flagged fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    Validated {
        output: ClassificationOutput,
    },
    Fallback {
        output: ClassificationOutput,
        reason: FallbackReason,
        /// Bounded prefix of the raw reply, for diagnostics.
        raw_preview: String,
    },
}

impl ClassificationOutcome {
    pub fn output(&self) -> &ClassificationOutput {
        match self {
            ClassificationOutcome::Validated { output } => output,
            ClassificationOutcome::Fallback { output, .. } => output,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ClassificationOutcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&FallbackReason> {
        match self {
            ClassificationOutcome::Fallback { reason, .. } => Some(reason),
            ClassificationOutcome::Validated { .. } => None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
