//! Fallback strategies for degraded results.
//!
//! A fallback supplies a substitute payload when the primary path
//! produced nothing usable. Each dependency registers at most one
//! strategy.

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::outcome::FailureReason;

/// Type alias for an async fallback producer.
pub type FallbackFn =
    Arc<dyn Fn(FailureReason) -> BoxFuture<'static, Option<Bytes>> + Send + Sync>;

/// Fallback strategy for one dependency.
#[derive(Clone)]
pub enum Fallback {
    /// A fixed payload.
    Value(Bytes),
    /// Replay the most recent primary payload for the operation.
    LastKnownGood,
    /// Compute a payload from the failure reason.
    Compute(FallbackFn),
}

impl Fallback {
    /// Fallback to a fixed payload.
    pub fn value(payload: impl Into<Bytes>) -> Self {
        Self::Value(payload.into())
    }

    /// Fallback to a fixed JSON value.
    pub fn json(value: Value) -> Self {
        Self::Value(Bytes::from(value.to_string()))
    }

    /// Fallback to the most recent primary payload seen for the
    /// operation. Resolves to nothing until a primary call succeeds.
    pub fn last_known_good() -> Self {
        Self::LastKnownGood
    }

    /// Fallback to a payload computed from the failure reason. The
    /// producer may return `None` to decline.
    pub fn compute<F, Fut>(f: F) -> Self
    where
        F: Fn(FailureReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        Self::Compute(Arc::new(move |reason| Box::pin(f(reason))))
    }

    pub(crate) async fn resolve(
        &self,
        cache: &LastGoodCache,
        operation: &str,
        reason: FailureReason,
    ) -> Option<Bytes> {
        match self {
            Self::Value(payload) => Some(payload.clone()),
            Self::LastKnownGood => {
                let cached = cache.get(operation);
                if cached.is_none() {
                    debug!(operation, "No last-known-good payload cached");
                }
                cached
            }
            Self::Compute(f) => f(reason).await,
        }
    }
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(payload) => f.debug_tuple("Value").field(&payload.len()).finish(),
            Self::LastKnownGood => f.write_str("LastKnownGood"),
            Self::Compute(_) => f.write_str("Compute"),
        }
    }
}

/// Most recent primary payloads, keyed by operation.
#[derive(Debug, Default)]
pub(crate) struct LastGoodCache {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl LastGoodCache {
    pub(crate) fn store(&self, operation: &str, payload: &Bytes) {
        self.entries
            .write()
            .insert(operation.to_string(), payload.clone());
    }

    pub(crate) fn get(&self, operation: &str) -> Option<Bytes> {
        self.entries.read().get(operation).cloned()
    }
}
