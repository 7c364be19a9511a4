//! Configuration types for fax classification runs.
//!
//! All run behaviour is controlled through [`ClassifierConfig`], built via its
//! [`ClassifierConfigBuilder`]. Defaults reproduce the settings the synthetic
//! fax corpus was calibrated against: 300 DPI, a three-page prefix for long
//! faxes, zero temperature, and a 0.65 confidence floor.

use crate::error::TriageError;
use crate::pipeline::quality::QualityThresholds;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::ProgressCallback;
use crate::usage::Pricing;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Practice the corpus faxes are addressed to; drives misdirection detection.
pub const DEFAULT_RECIPIENT: &str =
    "Whispering Pines Family Medicine (fax: 555-867-5309, provider: Dr. Evelyn Sato, DO)";

/// Configuration for rendering, classifying, and pricing a batch of faxes.
///
/// # Example
/// ```rust
/// use faxtriage::ClassifierConfig;
///
/// let config = ClassifierConfig::builder()
///     .dpi(200)
///     .max_attempts(5)
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// assert_eq!(config.retry.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 4000.
    ///
    /// Caps pathological page sizes; a letter page at 300 DPI (3300 px tall)
    /// stays under it.
    pub max_rendered_pixels: u32,

    /// Which pages of a long fax are sent to the classifier.
    pub page_cap: PageCapPolicy,

    /// Pixel-statistics thresholds for the page quality analyzer.
    pub quality: QualityThresholds,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the classifier may generate per document. Default: 1024.
    pub max_tokens: usize,

    /// Retry budget and backoff for transient transport failures.
    pub retry: RetryPolicy,

    /// Below this confidence the label is forced to `other`. Default: 0.65.
    pub confidence_threshold: f64,

    /// How much of an untrusted reply is kept for diagnostics. Default: 500 chars.
    pub raw_preview_chars: usize,

    /// Token prices used for cost estimates.
    pub pricing: Pricing,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom instruction block. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Practice identity the faxes should be addressed to.
    pub recipient: String,

    /// Per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            page_cap: PageCapPolicy::default(),
            quality: QualityThresholds::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            retry: RetryPolicy::default(),
            confidence_threshold: 0.65,
            raw_preview_chars: 500,
            pricing: Pricing::default(),
            password: None,
            system_prompt: None,
            recipient: DEFAULT_RECIPIENT.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_cap", &self.page_cap)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("pricing", &self.pricing)
            .field("recipient", &self.recipient)
            .finish()
    }
}

impl ClassifierConfig {
    /// Create a new builder for `ClassifierConfig`.
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name recorded in artifacts.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ClassifierConfig`].
#[derive(Debug)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_cap(mut self, policy: PageCapPolicy) -> Self {
        self.config.page_cap = policy;
        self
    }

    pub fn quality(mut self, thresholds: QualityThresholds) -> Self {
        self.config.quality = thresholds;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n.max(1);
        self
    }

    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.config.retry.base_delay = base;
        self.config.retry.max_delay = max;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    pub fn raw_preview_chars(mut self, n: usize) -> Self {
        self.config.raw_preview_chars = n;
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.config.pricing = pricing;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.config.recipient = recipient.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifierConfig, TriageError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(TriageError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(TriageError::InvalidConfig(format!(
                "Confidence threshold must be within 0.0–1.0, got {}",
                c.confidence_threshold
            )));
        }
        if c.page_cap.prefix == 0 {
            return Err(TriageError::InvalidConfig(
                "Page cap prefix must be ≥ 1".into(),
            ));
        }
        if c.retry.base_delay > c.retry.max_delay {
            return Err(TriageError::InvalidConfig(format!(
                "Retry base delay {:?} exceeds max delay {:?}",
                c.retry.base_delay, c.retry.max_delay
            )));
        }
        Ok(self.config)
    }
}

/// Page-count cap for long faxes.
///
/// Documents with more than `threshold` pages are classified from their first
/// `prefix` pages only; shorter documents are sent whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCapPolicy {
    pub threshold: usize,
    pub prefix: usize,
}

impl Default for PageCapPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            prefix: 3,
        }
    }
}

impl PageCapPolicy {
    /// Number of leading pages to render for a document of `total_pages`.
    pub fn pages_to_process(&self, total_pages: usize) -> usize {
        if total_pages > self.threshold {
            self.prefix.min(total_pages)
        } else {
            total_pages
        }
    }
}
