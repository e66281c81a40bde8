//! Call dispatch pipeline.
//!
//! The dispatcher owns one circuit breaker per dependency and threads
//! every call through admission, deadline-bounded attempts with retry,
//! breaker bookkeeping, and fallback resolution, emitting one outcome
//! event per call.
//!
//! ## Example
//!
//! ```rust,ignore
//! use contactor::{
//!     BreakerConfig, CallArgs, DependencyConfig, Dispatcher, Fallback, HttpTarget, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! let target = HttpTarget::builder("http://localhost:8080/api/v1/callee").build()?;
//!
//! let dispatcher = Dispatcher::builder()
//!     .dependency(
//!         DependencyConfig::new("callee-v1")
//!             .breaker(BreakerConfig::default().failure_rate_threshold(0.5))
//!             .retry(RetryPolicy::constant(3, Duration::from_millis(500)))
//!             .attempt_timeout(Duration::from_secs(2))
//!             .fallback(Fallback::json(serde_json::json!({"message": "degraded"})))
//!             .operation("hello", target.get("/hello")),
//!     )
//!     .build();
//!
//! let result = dispatcher.call("callee-v1", "hello", CallArgs::new()).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::{CallOptions, DependencyConfig};
use crate::error::{DispatchError, InvocationFailure, Result};
use crate::events::{CallEvent, EventSink, Resolution, TracingEventSink};
use crate::fallback::{Fallback, LastGoodCache};
use crate::invoker::{CallArgs, RemoteOperation};
use crate::outcome::{CallOutcome, CallResult, FailureReason};
use crate::retry::RetryPolicy;

struct DependencyEntry {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    fallback: Option<Fallback>,
    operations: HashMap<String, Arc<dyn RemoteOperation>>,
    last_good: LastGoodCache,
}

/// Resilient dispatcher over a set of remote dependencies.
///
/// Shared freely across tasks; all per-dependency state is internally
/// synchronized and breakers for different dependencies never contend.
pub struct Dispatcher {
    dependencies: HashMap<String, DependencyEntry>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Create a dispatcher builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatch a call with the dependency's configured policies.
    pub async fn call(
        &self,
        dependency: &str,
        operation: &str,
        args: CallArgs,
    ) -> Result<CallResult> {
        self.call_with(dependency, operation, args, CallOptions::default())
            .await
    }

    /// Dispatch a call with per-call policy overrides.
    pub async fn call_with(
        &self,
        dependency: &str,
        operation: &str,
        args: CallArgs,
        options: CallOptions,
    ) -> Result<CallResult> {
        let started = Instant::now();

        let entry = self
            .dependencies
            .get(dependency)
            .ok_or_else(|| DispatchError::UnknownDependency(dependency.to_string()))?;
        let op = entry.operations.get(operation).ok_or_else(|| {
            DispatchError::UnknownOperation {
                dependency: dependency.to_string(),
                operation: operation.to_string(),
            }
        })?;

        let retry = options.retry.as_ref().unwrap_or(&entry.retry);
        let attempt_timeout = options.attempt_timeout.unwrap_or(entry.attempt_timeout);

        if !entry.breaker.admit().is_allowed() {
            debug!(dependency, operation, "Breaker rejected call");
            return self
                .resolve_failure(
                    entry,
                    dependency,
                    operation,
                    FailureReason::CircuitOpen,
                    DispatchError::RejectedByBreaker {
                        dependency: dependency.to_string(),
                    },
                    0,
                    started,
                )
                .await;
        }

        let (outcome, attempts) = self
            .run_attempts(entry, op, &args, retry, attempt_timeout)
            .await;
        entry.breaker.record(&outcome);

        match outcome {
            CallOutcome::Success(payload) => {
                if matches!(entry.fallback, Some(Fallback::LastKnownGood)) {
                    entry.last_good.store(operation, &payload);
                }
                let latency = started.elapsed();
                self.emit(
                    dependency,
                    operation,
                    Resolution::Primary,
                    None,
                    attempts,
                    latency,
                );
                Ok(CallResult::primary(payload, attempts, latency))
            }
            CallOutcome::Failure(failure) => {
                let reason = FailureReason::Invocation(failure.kind);
                self.resolve_failure(
                    entry,
                    dependency,
                    operation,
                    reason,
                    DispatchError::Invocation(failure),
                    attempts,
                    started,
                )
                .await
            }
            CallOutcome::Timeout(elapsed) => {
                self.resolve_failure(
                    entry,
                    dependency,
                    operation,
                    FailureReason::Timeout,
                    DispatchError::Timeout(elapsed),
                    attempts,
                    started,
                )
                .await
            }
        }
    }

    /// Get the breaker guarding the named dependency.
    pub fn breaker(&self, dependency: &str) -> Option<&CircuitBreaker> {
        self.dependencies
            .get(dependency)
            .map(|entry| entry.breaker.as_ref())
    }

    /// Get a point-in-time view of every breaker.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.dependencies
            .values()
            .map(|entry| entry.breaker.snapshot())
            .collect()
    }

    /// Run attempts until success, a non-retryable outcome, or the
    /// attempt budget is spent. Returns the final outcome unchanged.
    async fn run_attempts(
        &self,
        entry: &DependencyEntry,
        operation: &Arc<dyn RemoteOperation>,
        args: &CallArgs,
        retry: &RetryPolicy,
        attempt_timeout: Duration,
    ) -> (CallOutcome, u32) {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            let outcome = self
                .run_one(entry, operation, args.clone(), attempt_timeout)
                .await;
            attempt += 1;

            if attempt >= max_attempts || !retry.should_retry(&outcome) {
                return (outcome, attempt);
            }

            let delay = retry.delay_for_attempt(attempt - 1);
            debug!(attempt, delay = ?delay, "Retrying call");
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Run one attempt under the deadline. On expiry the attempt keeps
    /// running detached and its eventual outcome feeds breaker
    /// bookkeeping only.
    async fn run_one(
        &self,
        entry: &DependencyEntry,
        operation: &Arc<dyn RemoteOperation>,
        args: CallArgs,
        attempt_timeout: Duration,
    ) -> CallOutcome {
        let mut handle = tokio::spawn(operation.invoke(args));

        match tokio::time::timeout(attempt_timeout, &mut handle).await {
            Ok(Ok(Ok(payload))) => CallOutcome::Success(payload),
            Ok(Ok(Err(failure))) => CallOutcome::Failure(failure),
            Ok(Err(join_err)) => CallOutcome::Failure(InvocationFailure::network(format!(
                "invoker task failed: {}",
                join_err
            ))),
            Err(_) => {
                let breaker = Arc::clone(&entry.breaker);
                tokio::spawn(async move {
                    if let Ok(result) = handle.await {
                        let late = match result {
                            Ok(payload) => CallOutcome::Success(payload),
                            Err(failure) => CallOutcome::Failure(failure),
                        };
                        breaker.record_late(&late);
                    }
                });
                CallOutcome::Timeout(attempt_timeout)
            }
        }
    }

    /// Resolve a failed primary path through the fallback, or surface
    /// `DependencyUnavailable`.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_failure(
        &self,
        entry: &DependencyEntry,
        dependency: &str,
        operation: &str,
        reason: FailureReason,
        failure: DispatchError,
        attempts: u32,
        started: Instant,
    ) -> Result<CallResult> {
        if let Some(fallback) = &entry.fallback {
            if let Some(payload) = fallback.resolve(&entry.last_good, operation, reason).await {
                let latency = started.elapsed();
                self.emit(
                    dependency,
                    operation,
                    Resolution::Fallback,
                    Some(reason),
                    attempts,
                    latency,
                );
                return Ok(CallResult::fallback(payload, reason, attempts, latency));
            }

            warn!(dependency, operation, "Fallback produced no result");
            let latency = started.elapsed();
            self.emit(
                dependency,
                operation,
                Resolution::Unavailable,
                Some(reason),
                attempts,
                latency,
            );
            return Err(DispatchError::DependencyUnavailable {
                dependency: dependency.to_string(),
                reason: Box::new(DispatchError::FallbackUnavailable {
                    dependency: dependency.to_string(),
                    cause: Box::new(failure),
                }),
            });
        }

        let latency = started.elapsed();
        self.emit(
            dependency,
            operation,
            Resolution::Unavailable,
            Some(reason),
            attempts,
            latency,
        );
        Err(DispatchError::DependencyUnavailable {
            dependency: dependency.to_string(),
            reason: Box::new(failure),
        })
    }

    fn emit(
        &self,
        dependency: &str,
        operation: &str,
        resolution: Resolution,
        reason: Option<FailureReason>,
        attempts: u32,
        latency: Duration,
    ) {
        self.events.record(&CallEvent {
            dependency: dependency.to_string(),
            operation: operation.to_string(),
            resolution,
            reason,
            attempts,
            latency,
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "dependencies",
                &self.dependencies.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    dependencies: Vec<DependencyConfig>,
    events: Arc<dyn EventSink>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            dependencies: Vec::new(),
            events: Arc::new(TracingEventSink),
        }
    }

    /// Register a dependency. Registering the same name again replaces
    /// the earlier configuration.
    pub fn dependency(mut self, config: DependencyConfig) -> Self {
        self.dependencies.push(config);
        self
    }

    /// Set the outcome event sink. Defaults to [`TracingEventSink`].
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Build the dispatcher. Per-dependency state is frozen from here
    /// on.
    pub fn build(self) -> Dispatcher {
        let dependencies = self
            .dependencies
            .into_iter()
            .map(|config| {
                let breaker = Arc::new(CircuitBreaker::new(config.name.clone(), config.breaker));
                let entry = DependencyEntry {
                    breaker,
                    retry: config.retry,
                    attempt_timeout: config.attempt_timeout,
                    fallback: config.fallback,
                    operations: config.operations,
                    last_good: LastGoodCache::default(),
                };
                (config.name, entry)
            })
            .collect();

        Dispatcher {
            dependencies,
            events: self.events,
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
