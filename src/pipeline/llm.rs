//! Classifier invocation: the backend seam, provider resolution, and the
//! retry-wrapped call that produces a [`ClassificationOutcome`].
//!
//! All prompt text lives in [`crate::prompts`] and all reply handling in
//! [`crate::pipeline::response`]; this module only moves a request to a
//! provider and the reply back.

use crate::config::{ClassifierConfig, DEFAULT_MODEL};
use crate::error::TriageError;
use crate::pipeline::render::DocumentRenderResult;
use crate::pipeline::request::{build_request, ClassificationRequest};
use crate::pipeline::response::interpret_reply;
use crate::pipeline::retry::{BackendError, FailureKind};
use crate::taxonomy::ClassificationOutcome;
use crate::usage::TokenUsage;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, LlmError, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Raw text plus the provider's token report for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub text: String,
    pub usage: TokenUsage,
}

/// Something that can answer a [`ClassificationRequest`].
///
/// Implementations report failures as [`BackendError`] so the retry policy
/// can decide whether to try again.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn complete(&self, request: &ClassificationRequest) -> Result<BackendReply, BackendError>;

    /// Identifier recorded in batch artifacts.
    fn model_name(&self) -> String;
}

/// [`ClassifierBackend`] over any edgequake-llm provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, TriageError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.model_name()))
    }
}

#[async_trait]
impl ClassifierBackend for LlmBackend {
    async fn complete(&self, request: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        let messages = request.to_messages();
        let options = request.completion_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(backend_error)?;

        Ok(BackendReply {
            text: response.content,
            usage: TokenUsage::new(response.prompt_tokens as u64, response.completion_tokens as u64),
        })
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, TriageError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TriageError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Map a provider error onto a [`FailureKind`]; only untyped API and
/// provider errors fall back to reading the message.
pub fn backend_error(err: LlmError) -> BackendError {
    let kind = match &err {
        LlmError::RateLimited(_) => FailureKind::RateLimited,
        LlmError::AuthError(_) | LlmError::ConfigError(_) => FailureKind::Authentication,
        LlmError::InvalidRequest(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::ModelNotFound(_)
        | LlmError::NotSupported(_) => FailureKind::InvalidRequest,
        LlmError::NetworkError(_) => FailureKind::Network,
        LlmError::Timeout => FailureKind::Timeout,
        LlmError::ApiError(msg) | LlmError::ProviderError(msg) | LlmError::Unknown(msg) => {
            FailureKind::classify(msg)
        }
        _ => FailureKind::Unknown,
    };
    BackendError::new(kind, err.to_string())
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. Anthropic, when `ANTHROPIC_API_KEY` is set
/// 5. `ProviderFactory::from_env`
pub fn resolve_provider(config: &ClassifierConfig) -> Result<Arc<dyn LLMProvider>, TriageError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("ANTHROPIC_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("anthropic", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TriageError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from the environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

/// Outcome of classifying one rendered document.
#[derive(Debug, Clone)]
pub struct Classification {
    pub outcome: ClassificationOutcome,
    /// Tokens of the successful call; counted for fallbacks too.
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// Classify one rendered document.
///
/// Malformed replies come back as a fallback outcome; only transport failures
/// (after the retry budget) are errors.
pub async fn classify_rendered(
    backend: &dyn ClassifierBackend,
    rendered: &DocumentRenderResult,
    config: &ClassifierConfig,
) -> Result<Classification, TriageError> {
    let request = build_request(rendered, config);

    let (reply, attempts) = config
        .retry
        .run(|attempt| {
            debug!(
                "Classifier attempt {} with {} page image(s)",
                attempt,
                request.images.len()
            );
            backend.complete(&request)
        })
        .await?;

    debug!(
        "Classifier reply: {} input tokens, {} output tokens",
        reply.usage.input_tokens, reply.usage.output_tokens
    );

    let outcome = interpret_reply(
        &reply.text,
        rendered.pages_processed_count,
        rendered.overall_quality,
        config.confidence_threshold,
        config.raw_preview_chars,
    );

    Ok(Classification {
        outcome,
        usage: reply.usage,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{DocumentType, PageQuality};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        replies: Mutex<Vec<Result<BackendReply, BackendError>>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<BackendReply, BackendError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl ClassifierBackend for Scripted {
        async fn complete(&self, _: &ClassificationRequest) -> Result<BackendReply, BackendError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(BackendError::new(FailureKind::Unknown, "script exhausted")))
        }

        fn model_name(&self) -> String {
            "scripted".into()
        }
    }

    fn reply(text: &str) -> Result<BackendReply, BackendError> {
        Ok(BackendReply {
            text: text.into(),
            usage: TokenUsage::new(1500, 200),
        })
    }

    fn rendered() -> DocumentRenderResult {
        DocumentRenderResult {
            images: vec![],
            total_page_count: 1,
            pages_processed_count: 1,
            overall_quality: PageQuality::Good,
            page_analyses: vec![],
        }
    }

    fn fast_config() -> ClassifierConfig {
        ClassifierConfig::builder()
            .retry_delays(Duration::from_millis(1), Duration::from_millis(2))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn valid_reply_is_validated() {
        let backend = Scripted::new(vec![reply(
            r#"{"document_type":"records_request","confidence":0.9,"priority":"medium"}"#,
        )]);
        let c = classify_rendered(&backend, &rendered(), &fast_config()).await.unwrap();
        assert_eq!(c.outcome.output().document_type, DocumentType::RecordsRequest);
        assert_eq!(c.attempts, 1);
        assert_eq!(c.usage, TokenUsage::new(1500, 200));
    }

    #[tokio::test]
    async fn garbage_reply_still_counts_tokens() {
        let backend = Scripted::new(vec![reply("Sorry, I can't read this fax.")]);
        let c = classify_rendered(&backend, &rendered(), &fast_config()).await.unwrap();
        assert!(c.outcome.is_fallback());
        assert_eq!(c.usage.total_tokens(), 1700);
    }

    #[tokio::test]
    async fn rate_limit_then_success() {
        let backend = Scripted::new(vec![
            Err(BackendError::from_message("429 Too Many Requests")),
            reply(r#"{"document_type":"marketing_junk","confidence":0.99}"#),
        ]);
        let c = classify_rendered(&backend, &rendered(), &fast_config()).await.unwrap();
        assert_eq!(c.attempts, 2);
        assert_eq!(c.outcome.output().document_type, DocumentType::MarketingJunk);
    }

    #[tokio::test]
    async fn auth_failure_propagates() {
        let backend = Scripted::new(vec![Err(BackendError::from_message("401 Unauthorized"))]);
        let err = classify_rendered(&backend, &rendered(), &fast_config()).await.unwrap_err();
        assert!(err.is_transport_error());
    }

    #[test]
    fn typed_provider_errors_keep_their_kind() {
        let cases = [
            (LlmError::RateLimited("slow down".into()), FailureKind::RateLimited),
            (LlmError::AuthError("bad key".into()), FailureKind::Authentication),
            (
                LlmError::TokenLimitExceeded { max: 4096, got: 5000 },
                FailureKind::InvalidRequest,
            ),
            (LlmError::ModelNotFound("claude-x".into()), FailureKind::InvalidRequest),
            (LlmError::NetworkError("reset".into()), FailureKind::Network),
            (LlmError::Timeout, FailureKind::Timeout),
            (
                LlmError::ApiError("400 Bad Request: image exceeds 5000000 bytes".into()),
                FailureKind::InvalidRequest,
            ),
            (
                LlmError::ProviderError("503 Service Unavailable".into()),
                FailureKind::ServerError,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(backend_error(err).kind, kind);
        }
    }

    #[tokio::test]
    async fn oversized_request_is_not_retried() {
        let backend = Scripted::new(vec![
            Err(backend_error(LlmError::ApiError(
                "400 Bad Request: image exceeds 5000000 bytes".into(),
            ))),
            reply(r#"{"document_type":"other","confidence":0.9}"#),
        ]);
        let err = classify_rendered(&backend, &rendered(), &fast_config()).await.unwrap_err();
        assert!(matches!(
            err,
            TriageError::TransportFatal { kind: FailureKind::InvalidRequest, .. }
        ));
    }

    #[test]
    fn explicit_provider_name_without_key_is_not_configured() {
        let config = ClassifierConfig::builder()
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        assert!(matches!(
            resolve_provider(&config),
            Err(TriageError::ProviderNotConfigured { .. })
        ));
    }
}
