//! Failure classification and backoff policy
//!
//! Every [`ApiError`] is classified before any retry decision is made, so
//! the retry loop only ever looks at a [`Failure`].

use std::time::Duration;

use super::Deadline;
use crate::config::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY, DigestSettings};
use crate::error::DigestError;
use crate::gmail::ApiError;

/// Longest single backoff wait
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Attempts and delays for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &DigestSettings) -> Self {
        Self {
            max_attempts: settings.retry_attempts.max(1),
            base_delay: settings.retry_base_delay,
        }
    }

    /// Wait before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << retry.min(16))
            .min(MAX_BACKOFF)
    }
}

/// Why a call may succeed if repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// HTTP 429
    RateLimited,
    /// HTTP 5xx
    ServerError,
    /// Connect, TLS, I/O or per-request timeout
    Connection,
}

/// What to do about a failed call
#[derive(Debug)]
pub enum Failure {
    Retryable { reason: RetryReason, detail: String },
    /// HTTP 401: refresh the credential once and repeat
    Unauthorized,
    /// Give up with this error
    Fatal(DigestError),
}

/// Classify a failed call
pub fn classify(err: ApiError, deadline: &Deadline) -> Failure {
    match err {
        ApiError::Status { status: 429, message } => Failure::Retryable {
            reason: RetryReason::RateLimited,
            detail: message,
        },
        ApiError::Status { status: 401, .. } => Failure::Unauthorized,
        ApiError::Status { status, message } if status >= 500 => Failure::Retryable {
            reason: RetryReason::ServerError,
            detail: format!("HTTP {}: {}", status, message),
        },
        ApiError::Status { status, message } => Failure::Fatal(DigestError::Validation(format!(
            "request rejected with HTTP {}: {}",
            status, message
        ))),
        ApiError::Timeout if deadline.is_expired() => Failure::Fatal(DigestError::Timeout),
        ApiError::Timeout => Failure::Retryable {
            reason: RetryReason::Connection,
            detail: "request timed out".to_string(),
        },
        // A truncated 2xx body looks like a decode failure
        ApiError::Transport(detail) | ApiError::Decode(detail) => Failure::Retryable {
            reason: RetryReason::Connection,
            detail,
        },
    }
}

/// The error surfaced once the retry budget is spent
pub fn exhausted(reason: RetryReason, attempts: u32, detail: &str) -> DigestError {
    match reason {
        RetryReason::RateLimited => DigestError::RateLimit { attempts },
        RetryReason::ServerError | RetryReason::Connection => {
            DigestError::Network(format!("giving up after {} attempts: {}", attempts, detail))
        }
    }
}
