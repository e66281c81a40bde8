//! Retry policy and backoff strategies.

use std::time::Duration;

use crate::error::FailureKind;
use crate::outcome::CallOutcome;

/// Backoff strategy between attempts.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between attempts.
    None,
    /// Constant delay between attempts.
    Constant(Duration),
    /// Exponential backoff: delay grows by the multiplier each attempt.
    Exponential {
        /// Initial delay.
        initial: Duration,
        /// Maximum delay.
        max: Duration,
        /// Multiplier (typically 2.0).
        multiplier: f64,
    },
    /// Explicit per-attempt waits; indexed by attempt, clamped to the
    /// last entry.
    Schedule(Vec<Duration>),
}

impl BackoffStrategy {
    /// Calculate the wait before the retry following the given attempt
    /// (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let factor = multiplier.powi(attempt as i32);
                let millis = (initial.as_millis() as f64 * factor) as u64;
                Duration::from_millis(millis).min(*max)
            }
            Self::Schedule(waits) => waits
                .get(attempt as usize)
                .or_else(|| waits.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        }
    }
}

/// Retry policy for calls against one dependency.
///
/// Client errors (4xx) and deserialization or request-build failures
/// are never retried, regardless of configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff strategy between attempts.
    pub backoff: BackoffStrategy,
    /// Status codes that should trigger a retry.
    pub retry_status_codes: Vec<u16>,
    /// Whether to retry on network errors.
    pub retry_on_network_error: bool,
    /// Whether to retry on attempt timeouts.
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Constant(Duration::from_millis(500)),
            retry_status_codes: vec![500, 502, 503, 504],
            retry_on_network_error: true,
            retry_on_timeout: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::None,
            ..Default::default()
        }
    }

    /// Create a policy with a constant delay.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Constant(delay),
            ..Default::default()
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::Exponential {
                initial: initial_delay,
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
            ..Default::default()
        }
    }

    /// Create a policy from an explicit wait schedule. Each wait
    /// precedes one retry, so the attempt count is one more than the
    /// schedule length.
    pub fn schedule(waits: Vec<Duration>) -> Self {
        Self {
            max_attempts: waits.len() as u32 + 1,
            backoff: BackoffStrategy::Schedule(waits),
            ..Default::default()
        }
    }

    /// Set the status codes that trigger a retry.
    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retry_status_codes = codes;
        self
    }

    /// Disable retry on network errors.
    pub fn no_retry_on_network(mut self) -> Self {
        self.retry_on_network_error = false;
        self
    }

    /// Disable retry on attempt timeouts.
    pub fn no_retry_on_timeout(mut self) -> Self {
        self.retry_on_timeout = false;
        self
    }

    /// Calculate the wait before the retry following the given attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }

    /// Check whether the outcome warrants another attempt.
    pub fn should_retry(&self, outcome: &CallOutcome) -> bool {
        match outcome {
            CallOutcome::Success(_) => false,
            CallOutcome::Timeout(_) => self.retry_on_timeout,
            CallOutcome::Failure(f) => match f.kind {
                FailureKind::Network => self.retry_on_network_error,
                FailureKind::Status(code) => {
                    !f.kind.is_client_error() && self.retry_status_codes.contains(&code)
                }
                FailureKind::Deserialize | FailureKind::Request => false,
            },
        }
    }
}
