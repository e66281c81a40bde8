//! Call outcomes and results.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{DispatchError, FailureKind, InvocationFailure, Result};

/// Final outcome of a dispatched call, after retries.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    /// The invocation returned a payload.
    Success(Bytes),
    /// The invocation failed.
    Failure(InvocationFailure),
    /// The attempt deadline elapsed before the invocation returned.
    Timeout(Duration),
}

impl CallOutcome {
    /// Whether this outcome counts as a success for breaker bookkeeping.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Why the primary path produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The breaker rejected the call without attempting it.
    CircuitOpen,
    /// The final attempt timed out.
    Timeout,
    /// The final attempt failed with the given kind.
    Invocation(FailureKind),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircuitOpen => write!(f, "circuit open"),
            Self::Timeout => write!(f, "timeout"),
            Self::Invocation(kind) => write!(f, "{}", kind),
        }
    }
}

/// Where a call result's payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The remote dependency answered.
    Primary,
    /// The registered fallback supplied the payload.
    Fallback(FailureReason),
}

/// Result of a dispatched call.
#[derive(Debug, Clone)]
pub struct CallResult {
    payload: Bytes,
    provenance: Provenance,
    attempts: u32,
    latency: Duration,
}

impl CallResult {
    pub(crate) fn primary(payload: Bytes, attempts: u32, latency: Duration) -> Self {
        Self {
            payload,
            provenance: Provenance::Primary,
            attempts,
            latency,
        }
    }

    pub(crate) fn fallback(
        payload: Bytes,
        reason: FailureReason,
        attempts: u32,
        latency: Duration,
    ) -> Self {
        Self {
            payload,
            provenance: Provenance::Fallback(reason),
            attempts,
            latency,
        }
    }

    /// Get the payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the result and return the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Get the payload provenance.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Whether the payload came from the remote dependency.
    pub fn is_primary(&self) -> bool {
        matches!(self.provenance, Provenance::Primary)
    }

    /// Whether the payload came from a fallback.
    pub fn is_fallback(&self) -> bool {
        matches!(self.provenance, Provenance::Fallback(_))
    }

    /// Get the reason the fallback was used, if it was.
    pub fn fallback_reason(&self) -> Option<FailureReason> {
        match self.provenance {
            Provenance::Fallback(reason) => Some(reason),
            Provenance::Primary => None,
        }
    }

    /// Number of attempts made against the remote (0 when the breaker
    /// rejected the call outright).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total time spent dispatching the call.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Parse the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            DispatchError::Invocation(InvocationFailure::deserialize(e.to_string()))
        })
    }

    /// Get the payload as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.payload.to_vec()).map_err(|e| {
            DispatchError::Invocation(InvocationFailure::deserialize(e.to_string()))
        })
    }
}
