//! Per-dependency circuit breaker.
//!
//! The breaker gates admission to a single remote dependency and tracks
//! outcomes in a count-based sliding window.
//!
//! ## States
//!
//! - **Closed**: calls are admitted; outcomes feed the failure window
//! - **Open**: calls are rejected until the open duration elapses
//! - **Half-Open**: a bounded batch of trial calls probes recovery
//!
//! ## Example
//!
//! ```rust,ignore
//! use contactor::{BreakerConfig, CircuitBreaker};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     "billing",
//!     BreakerConfig::default()
//!         .failure_rate_threshold(0.5)
//!         .min_samples(10)
//!         .open_duration(Duration::from_secs(10)),
//! );
//!
//! if breaker.admit().is_allowed() {
//!     // perform the call, then breaker.record(&outcome)
//! }
//! ```

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::outcome::CallOutcome;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// A limited trial batch probes recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Admission decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    /// The call may proceed to the invoker.
    Allowed,
    /// The call must not reach the invoker.
    Rejected,
}

impl AdmitDecision {
    /// Whether the call was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure ratio (0.0 to 1.0) at or above which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Number of outcomes the sliding window holds.
    pub window_size: usize,
    /// Minimum outcomes in the window before the ratio is acted on.
    pub min_samples: usize,
    /// Time to stay open before admitting trial calls.
    pub open_duration: Duration,
    /// Number of trial calls admitted while half-open.
    pub trial_permits: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_size: 100,
            min_samples: 10,
            open_duration: Duration::from_secs(30),
            trial_permits: 3,
        }
    }
}

impl BreakerConfig {
    /// Set the failure rate threshold.
    pub fn failure_rate_threshold(mut self, threshold: f64) -> Self {
        self.failure_rate_threshold = threshold;
        self
    }

    /// Set the sliding window size.
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the minimum sample count.
    pub fn min_samples(mut self, samples: usize) -> Self {
        self.min_samples = samples;
        self
    }

    /// Set the open duration.
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the number of half-open trial permits.
    pub fn trial_permits(mut self, permits: u32) -> Self {
        self.trial_permits = permits;
        self
    }

    fn normalized(mut self) -> Self {
        self.failure_rate_threshold = self.failure_rate_threshold.clamp(0.0, 1.0);
        self.window_size = self.window_size.max(1);
        self.min_samples = self.min_samples.clamp(1, self.window_size);
        self.trial_permits = self.trial_permits.max(1);
        self
    }
}

/// Count-based ring of recent outcomes, true meaning failure.
#[derive(Debug)]
struct FailureWindow {
    slots: Vec<bool>,
    head: usize,
    filled: usize,
}

impl FailureWindow {
    fn new(size: usize) -> Self {
        Self {
            slots: vec![false; size],
            head: 0,
            filled: 0,
        }
    }

    fn record(&mut self, failure: bool) {
        self.slots[self.head] = failure;
        self.head = (self.head + 1) % self.slots.len();
        if self.filled < self.slots.len() {
            self.filled += 1;
        }
    }

    fn samples(&self) -> usize {
        self.filled
    }

    fn failure_rate(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        let failures = self.slots.iter().take(self.filled).filter(|&&f| f).count();
        failures as f64 / self.filled as f64
    }

    fn clear(&mut self) {
        self.slots.fill(false);
        self.head = 0;
        self.filled = 0;
    }
}

/// Internal breaker state, serialized behind one lock.
struct BreakerInner {
    state: CircuitState,
    window: FailureWindow,
    opened_at: Option<Instant>,
    trials_admitted: u32,
    trial_successes: u32,
    total_rejections: u64,
}

/// Circuit breaker for one remote dependency.
///
/// Admission and recording are synchronous and never touch I/O, so the
/// dispatcher can decide on fallback without waiting on the invoker.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        let config = config.normalized();

        info!(
            name = %name,
            threshold = config.failure_rate_threshold,
            window = config.window_size,
            min_samples = config.min_samples,
            open_duration = ?config.open_duration,
            "Circuit breaker initialized"
        );

        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: FailureWindow::new(config.window_size),
                opened_at: None,
                trials_admitted: 0,
                trial_successes: 0,
                total_rejections: 0,
            }),
            name,
            config,
        }
    }

    /// Get the dependency name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Decide whether a call may proceed. Never blocks.
    pub fn admit(&self) -> AdmitDecision {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => AdmitDecision::Allowed,
            CircuitState::Open => {
                inner.total_rejections += 1;
                AdmitDecision::Rejected
            }
            CircuitState::HalfOpen => {
                if inner.trials_admitted < self.config.trial_permits {
                    inner.trials_admitted += 1;
                    debug!(
                        name = %self.name,
                        trial = inner.trials_admitted,
                        "Admitting half-open trial call"
                    );
                    AdmitDecision::Allowed
                } else {
                    inner.total_rejections += 1;
                    AdmitDecision::Rejected
                }
            }
        }
    }

    /// Record the final outcome of an admitted call.
    pub fn record(&self, outcome: &CallOutcome) {
        let failure = !outcome.is_success();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => self.record_closed(&mut inner, failure),
            CircuitState::HalfOpen => {
                if failure {
                    // A single failed trial reopens and restarts the timer.
                    self.open_locked(&mut inner);
                } else {
                    inner.trial_successes += 1;
                    if inner.trial_successes >= self.config.trial_permits {
                        self.close_locked(&mut inner);
                    }
                }
            }
            CircuitState::Open => {
                debug!(name = %self.name, "Outcome recorded while open, ignoring");
            }
        }
    }

    /// Record an outcome that arrived after its attempt already timed
    /// out. Updates the window while Closed; dropped in any other state
    /// so stale results never drive trial accounting.
    pub fn record_late(&self, outcome: &CallOutcome) {
        let failure = !outcome.is_success();
        let mut inner = self.inner.lock();

        if inner.state != CircuitState::Closed {
            debug!(
                name = %self.name,
                state = %inner.state,
                "Dropping late outcome"
            );
            return;
        }
        self.record_closed(&mut inner, failure);
    }

    /// Manually reset the breaker to closed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.close_locked(&mut inner);
    }

    /// Manually force the breaker open.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.open_locked(&mut inner);
    }

    /// Get a point-in-time view of the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);

        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            samples: inner.window.samples(),
            failure_rate: inner.window.failure_rate(),
            total_rejections: inner.total_rejections,
        }
    }

    fn record_closed(&self, inner: &mut BreakerInner, failure: bool) {
        inner.window.record(failure);
        if inner.window.samples() >= self.config.min_samples
            && inner.window.failure_rate() >= self.config.failure_rate_threshold
        {
            self.open_locked(inner);
        }
    }

    fn open_locked(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            warn!(
                name = %self.name,
                failure_rate = inner.window.failure_rate(),
                "Circuit breaker OPENED"
            );
        }
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.trials_admitted = 0;
        inner.trial_successes = 0;
    }

    fn close_locked(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Closed {
            info!(name = %self.name, "Circuit breaker CLOSED");
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
            inner.window.clear();
            inner.trials_admitted = 0;
            inner.trial_successes = 0;
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.open_duration
        {
            debug!(name = %self.name, "Circuit breaker transitioning to HALF-OPEN");
            inner.state = CircuitState::HalfOpen;
            inner.trials_admitted = 0;
            inner.trial_successes = 0;
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Outcomes currently in the window.
    pub samples: usize,
    /// Failure ratio over the window (0.0 to 1.0).
    pub failure_rate: f64,
    /// Calls rejected since creation.
    pub total_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvocationFailure;
    use bytes::Bytes;

    fn success() -> CallOutcome {
        CallOutcome::Success(Bytes::from_static(b"ok"))
    }

    fn failure() -> CallOutcome {
        CallOutcome::Failure(InvocationFailure::status(500, "boom"))
    }

    fn config() -> BreakerConfig {
        BreakerConfig::default()
            .window_size(10)
            .min_samples(10)
            .failure_rate_threshold(0.5)
    }

    #[test]
    fn test_opens_when_ratio_crosses_threshold() {
        let cb = CircuitBreaker::new("dep", config());

        for _ in 0..4 {
            cb.record(&success());
        }
        for _ in 0..5 {
            cb.record(&failure());
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        // Tenth sample pushes the ratio to 6/10.
        cb.record(&failure());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(), AdmitDecision::Rejected);
    }

    #[test]
    fn test_never_opens_below_min_samples() {
        let cb = CircuitBreaker::new("dep", config());

        for _ in 0..9 {
            cb.record(&failure());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.admit().is_allowed());
    }

    #[test]
    fn test_success_is_idempotent_while_closed() {
        let cb = CircuitBreaker::new("dep", config());

        for _ in 0..50 {
            cb.record(&success());
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_evicts_oldest_outcomes() {
        let cb = CircuitBreaker::new(
            "dep",
            BreakerConfig::default()
                .window_size(4)
                .min_samples(4)
                .failure_rate_threshold(0.9),
        );

        cb.record(&success());
        cb.record(&success());
        cb.record(&failure());
        cb.record(&failure());
        assert_eq!(cb.state(), CircuitState::Closed);

        // Two more failures evict the two successes; the window is now
        // all failures.
        cb.record(&failure());
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record(&failure());
        assert_eq!(cb.snapshot().failure_rate, 1.0);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_rejections_are_counted() {
        let cb = CircuitBreaker::new("dep", config());
        cb.force_open();

        assert_eq!(cb.admit(), AdmitDecision::Rejected);
        assert_eq!(cb.admit(), AdmitDecision::Rejected);
        assert_eq!(cb.snapshot().total_rejections, 2);
    }

    #[tokio::test]
    async fn test_half_open_after_open_duration() {
        let cb = CircuitBreaker::new(
            "dep",
            config().open_duration(Duration::from_millis(50)),
        );
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_admits_up_to_trial_permits() {
        let cb = CircuitBreaker::new(
            "dep",
            config()
                .open_duration(Duration::from_millis(50))
                .trial_permits(2),
        );
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cb.admit().is_allowed());
        assert!(cb.admit().is_allowed());
        assert_eq!(cb.admit(), AdmitDecision::Rejected);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let cb = CircuitBreaker::new(
            "dep",
            config()
                .open_duration(Duration::from_millis(50))
                .trial_permits(2),
        );
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cb.admit().is_allowed());
        cb.record(&failure());
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.admit(), AdmitDecision::Rejected);
    }

    #[tokio::test]
    async fn test_full_trial_batch_closes_and_clears_window() {
        let cb = CircuitBreaker::new(
            "dep",
            config()
                .open_duration(Duration::from_millis(50))
                .trial_permits(2),
        );

        for _ in 0..10 {
            cb.record(&failure());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cb.admit().is_allowed());
        assert!(cb.admit().is_allowed());
        cb.record(&success());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record(&success());

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().samples, 0);
    }

    #[test]
    fn test_late_outcomes_count_while_closed() {
        let cb = CircuitBreaker::new("dep", config());

        for _ in 0..10 {
            cb.record_late(&failure());
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_late_outcomes_ignored_while_half_open() {
        let cb = CircuitBreaker::new(
            "dep",
            config()
                .open_duration(Duration::from_millis(50))
                .trial_permits(1),
        );
        cb.force_open();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // A stale success must not close the breaker.
        cb.record_late(&success());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_reset_closes_and_clears() {
        let cb = CircuitBreaker::new("dep", config());
        for _ in 0..10 {
            cb.record(&failure());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().samples, 0);
    }
}
