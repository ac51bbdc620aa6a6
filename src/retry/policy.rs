//! Retry policy implementing exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Fraction of the computed backoff used as the jitter amplitude (±25%).
const JITTER_FRACTION: f64 = 0.25;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of times the operation may run (first attempt included).
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each attempt.
    pub backoff_multiplier: f64,
    /// Apply ±25% uniform jitter to each computed backoff.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy for the metadata service. Short backoff, the client-side rate
    /// limiter already spaces calls one second apart.
    pub fn metadata_service() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Policy for the object store: more attempts, shorter initial backoff.
    pub fn object_store() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Policy for the extraction tool: fewer attempts, longer backoff.
    pub fn extractor() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Backoff for 0-indexed `attempt`, before jitter.
    ///
    /// `initial * multiplier^attempt`, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = backoff.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Backoff for `attempt` with jitter applied when the policy enables it.
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        if !self.jitter {
            return base;
        }
        let factor: f64 = rand::rng().random_range(-1.0..=1.0);
        apply_jitter(base, factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Scales `base` by `1 + 0.25 * factor`, with `factor` in [-1, 1].
fn apply_jitter(base: Duration, factor: f64) -> Duration {
    let factor = factor.clamp(-1.0, 1.0);
    let millis = base.as_millis() as f64;
    let jittered = millis + millis * JITTER_FRACTION * factor;
    Duration::from_millis(jittered.max(0.0) as u64)
}

lazy_static::lazy_static! {
    static ref RETRYABLE_PATTERNS: Vec<&'static str> = vec![
        "connection refused",
        "connection reset",
        "timeout",
        "timed out",
        "temporary failure",
        "service unavailable",
        "too many requests",
        "rate limit",
        "503",
        "502",
        "504",
        "429",
    ];
}

/// Classifies a free-form error message as transient.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// HTTP statuses worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
