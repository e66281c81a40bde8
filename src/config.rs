//! Dispatcher configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::fallback::Fallback;
use crate::invoker::RemoteOperation;
use crate::retry::RetryPolicy;

/// Configuration for one remote dependency: its breaker, policies,
/// optional fallback, and named operations.
pub struct DependencyConfig {
    pub(crate) name: String,
    pub(crate) breaker: BreakerConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) attempt_timeout: Duration,
    pub(crate) fallback: Option<Fallback>,
    pub(crate) operations: HashMap<String, Arc<dyn RemoteOperation>>,
}

impl DependencyConfig {
    /// Create a configuration for the named dependency with default
    /// policies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            fallback: None,
            operations: HashMap::new(),
        }
    }

    /// Set the circuit breaker configuration.
    pub fn breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the per-attempt deadline.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Register the fallback strategy.
    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Register a named operation.
    pub fn operation(
        mut self,
        name: impl Into<String>,
        operation: impl RemoteOperation + 'static,
    ) -> Self {
        self.operations.insert(name.into(), Arc::new(operation));
        self
    }
}

impl std::fmt::Debug for DependencyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyConfig")
            .field("name", &self.name)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("fallback", &self.fallback)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Per-call overrides of a dependency's policies.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) retry: Option<RetryPolicy>,
}

impl CallOptions {
    /// Create empty options; the dependency's configuration applies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-attempt deadline for this call.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Override the retry policy for this call.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{CallArgs, OperationFn};
    use bytes::Bytes;

    #[test]
    fn test_defaults() {
        let config = DependencyConfig::new("billing");

        assert_eq!(config.name, "billing");
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
        assert!(config.fallback.is_none());
        assert!(config.operations.is_empty());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_operation_registration() {
        let config = DependencyConfig::new("billing")
            .operation(
                "hello",
                OperationFn::new(|_: CallArgs| async { Ok(Bytes::from_static(b"{}")) }),
            )
            .fallback(Fallback::value("degraded"));

        assert_eq!(config.operations.len(), 1);
        assert!(config.operations.contains_key("hello"));
        assert!(config.fallback.is_some());
    }

    #[test]
    fn test_call_options_start_empty() {
        let opts = CallOptions::new();
        assert!(opts.attempt_timeout.is_none());
        assert!(opts.retry.is_none());

        let opts = opts
            .attempt_timeout(Duration::from_secs(2))
            .retry(RetryPolicy::none());
        assert_eq!(opts.attempt_timeout, Some(Duration::from_secs(2)));
        assert_eq!(opts.retry.as_ref().map(|r| r.max_attempts), Some(1));
    }
}
