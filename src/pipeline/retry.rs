//! Bounded exponential-backoff retry for classifier calls.
//!
//! Which failures are worth retrying is data on [`RetryPolicy`], not control
//! flow: a failed call is first bucketed into a [`FailureKind`], and only kinds
//! present in `RetryPolicy::retryable` are attempted again. With the defaults
//! (3 attempts, 4 s base, 10 s cap) a persistently rate-limited call waits
//! 4 s, then 8 s, and then surfaces as [`TriageError::TransientFailure`].

use crate::error::TriageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

static RE_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[45]\d\d\b").unwrap());

/// Coarse category of a failed classifier call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 429 or an explicit rate-limit / overload message.
    RateLimited,
    /// 5xx from the provider.
    ServerError,
    Timeout,
    Network,
    /// Bad or missing credentials (401/403).
    Authentication,
    /// The provider rejected the request itself (400, payload too large, …).
    InvalidRequest,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network",
            FailureKind::Authentication => "authentication",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Bucket a provider error message.
    ///
    /// A standalone 3-digit HTTP status decides when present; only whole
    /// numbers count, so "5000000 bytes" or "max_tokens 4010" never read as a
    /// status. Otherwise the phrases the major vision APIs use are matched.
    pub fn classify(message: &str) -> FailureKind {
        if let Some(kind) = RE_STATUS
            .find(message)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .and_then(FailureKind::from_status)
        {
            return kind;
        }

        let m = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if has(&["invalid_request", "invalid request", "bad request", "malformed", "too large"]) {
            FailureKind::InvalidRequest
        } else if has(&["unauthorized", "forbidden", "api key", "api_key", "authentication"]) {
            FailureKind::Authentication
        } else if has(&["rate limit", "rate_limit", "ratelimit", "too many requests", "overloaded"]) {
            FailureKind::RateLimited
        } else if has(&["internal server error", "bad gateway", "service unavailable", "server error"]) {
            FailureKind::ServerError
        } else if has(&["timeout", "timed out"]) {
            FailureKind::Timeout
        } else if has(&["connection", "connect", "dns", "network", "broken pipe", "reset by peer"]) {
            FailureKind::Network
        } else {
            FailureKind::Unknown
        }
    }

    /// Kind for an HTTP status; `None` outside 4xx/5xx.
    pub fn from_status(status: u16) -> Option<FailureKind> {
        match status {
            429 | 529 => Some(FailureKind::RateLimited),
            401 | 403 => Some(FailureKind::Authentication),
            408 => Some(FailureKind::Timeout),
            400..=499 => Some(FailureKind::InvalidRequest),
            500..=599 => Some(FailureKind::ServerError),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed classifier call, as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from a provider message, inferring the kind.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for BackendError {}

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Minimum 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Failure kinds that are retried; everything else fails immediately.
    pub retryable: BTreeSet<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            retryable: [FailureKind::RateLimited, FailureKind::ServerError]
                .into_iter()
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay before retry number `retry` (1-based): `base × 2^(retry−1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Drive `op` until it succeeds, fails with a non-retryable kind, or the
    /// attempt budget runs out.
    ///
    /// `op` receives the 1-based attempt number. On success returns the value
    /// together with the number of attempts used.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<(T, u32), TriageError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if !self.is_retryable(err.kind) => {
                    warn!("Classifier call failed ({}), not retrying: {}", err.kind, err.message);
                    return Err(TriageError::TransportFatal {
                        kind: err.kind,
                        detail: err.message,
                    });
                }
                Err(err) if attempt >= max_attempts => {
                    warn!(
                        "Classifier call failed ({}) on final attempt {}/{}",
                        err.kind, attempt, max_attempts
                    );
                    return Err(TriageError::TransientFailure {
                        kind: err.kind,
                        attempts: attempt,
                        detail: err.message,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed ({}): {}; retrying in {:?}",
                        attempt, max_attempts, err.kind, err.message, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
