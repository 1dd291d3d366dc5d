//! Model-call failures.
//!
//! Callers care about three families: failures a network client retries on
//! its own (server and connection trouble), provider signatures the engine
//! absorbs with a fixed back-off at the turn boundary (rate limits, context
//! overflow), and everything else, which is reported as-is.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// HTTP 429 or an equivalent provider message
    RateLimited,
    /// Prompt larger than the model window
    ContextOverflow,
    /// 5xx
    ServerError,
    /// Other 4xx: auth, bad request, unknown model
    ClientError,
    /// Connection refused, reset or timed out
    NetworkError,
    /// The provider answered with something we could not read
    ParseError,
}

/// Phrases providers use when the prompt does not fit the context window.
const OVERFLOW_MARKERS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "context window",
    "prompt is too long",
    "too many tokens",
];

impl LlmErrorKind {
    /// Classify a failed exchange. An overflow phrase in the body wins over the status.
    pub fn classify(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();
        if OVERFLOW_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return Self::ContextOverflow;
        }
        match status {
            429 => Self::RateLimited,
            400..=499 => Self::ClientError,
            _ => Self::ServerError,
        }
    }

    /// Whether a client should retry the same request after a delay.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ServerError | Self::NetworkError)
    }

    fn label(self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limited",
            Self::ContextOverflow => "Context overflow",
            Self::ServerError => "Server error",
            Self::ClientError => "Client error",
            Self::NetworkError => "Network error",
            Self::ParseError => "Unreadable response",
        }
    }
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}: {message}", http_suffix(.status))]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Provider-requested wait (`Retry-After`)
    pub retry_after: Option<Duration>,
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" (HTTP {})", code)).unwrap_or_default()
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self::new(LlmErrorKind::RateLimited, message)
            .with_status(429)
            .with_retry_after(retry_after)
    }

    pub fn context_overflow(message: String) -> Self {
        Self::new(LlmErrorKind::ContextOverflow, message)
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, message).with_status(status)
    }

    pub fn network(message: String) -> Self {
        Self::new(LlmErrorKind::NetworkError, message)
    }

    pub fn unreadable(message: String) -> Self {
        Self::new(LlmErrorKind::ParseError, message)
    }

    /// Build the error for a non-success HTTP response.
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        Self::new(LlmErrorKind::classify(status, body), body.trim())
            .with_status(status)
            .with_retry_after(retry_after)
    }

    /// Rate-limit and context-overflow signatures, handled by back-off at the turn boundary.
    pub fn is_provider_signature(&self) -> bool {
        matches!(
            self.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ContextOverflow
        )
    }
}

/// Retry schedule a network client applies to retryable failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`, or `None` to give up.
    ///
    /// Doubles from `base_delay`; a provider `retry_after` replaces the
    /// computed value. Both are capped at `max_delay`.
    pub fn delay(&self, error: &LlmError, attempt: u32) -> Option<Duration> {
        if !error.kind.is_retryable() || attempt >= self.max_attempts {
            return None;
        }
        let delay = error.retry_after.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt))
        });
        Some(delay.min(self.max_delay))
    }
}
