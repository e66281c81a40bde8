//! Outcome events for observability.

use std::time::Duration;
use tracing::{info, warn};

use crate::outcome::FailureReason;

/// How a dispatched call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote dependency answered.
    Primary,
    /// A fallback payload was served.
    Fallback,
    /// Neither primary nor fallback produced a result.
    Unavailable,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// One outcome event, emitted per dispatched call.
#[derive(Debug, Clone)]
pub struct CallEvent {
    /// Dependency the call addressed.
    pub dependency: String,
    /// Operation the call addressed.
    pub operation: String,
    /// How the call was resolved.
    pub resolution: Resolution,
    /// Why the primary path produced nothing, when it did not.
    pub reason: Option<FailureReason>,
    /// Attempts made against the remote.
    pub attempts: u32,
    /// Total dispatch latency.
    pub latency: Duration,
}

/// Sink for call outcome events.
///
/// `record` is invoked once per dispatched call, fire-and-forget.
/// Implementations must not block the call path; hand heavy work to a
/// channel or task of their own.
pub trait EventSink: Send + Sync {
    /// Record one call event.
    fn record(&self, event: &CallEvent);
}

/// Default sink that emits structured tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &CallEvent) {
        match event.resolution {
            Resolution::Primary => info!(
                dependency = %event.dependency,
                operation = %event.operation,
                attempts = event.attempts,
                latency = ?event.latency,
                "Call resolved"
            ),
            Resolution::Fallback => warn!(
                dependency = %event.dependency,
                operation = %event.operation,
                reason = ?event.reason,
                attempts = event.attempts,
                latency = ?event.latency,
                "Call resolved by fallback"
            ),
            Resolution::Unavailable => warn!(
                dependency = %event.dependency,
                operation = %event.operation,
                reason = ?event.reason,
                attempts = event.attempts,
                latency = ?event.latency,
                "Call unavailable"
            ),
        }
    }
}
