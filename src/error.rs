//! Dispatch error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Classification of a failed invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport-level failure (connect error, DNS, broken stream).
    Network,
    /// The remote answered with a non-success status code.
    Status(u16),
    /// The response body could not be decoded.
    Deserialize,
    /// The request could not be built (bad URL, unresolved path
    /// parameter, body serialization).
    Request,
}

impl FailureKind {
    /// Whether this is a client-side (4xx) status failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Status(s) if (400..500).contains(s))
    }

    /// Get the status code if this is a status failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network error"),
            Self::Status(s) => write!(f, "status {}", s),
            Self::Deserialize => write!(f, "deserialization error"),
            Self::Request => write!(f, "request build error"),
        }
    }
}

/// A single failed invocation attempt.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct InvocationFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

impl InvocationFailure {
    /// Create a failure with the given kind and message.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    /// Create a status failure.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Status(status), message)
    }

    /// Create a deserialization failure.
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Deserialize, message)
    }

    /// Create a request-build failure.
    pub fn request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Request, message)
    }
}

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Circuit breaker rejected the call before any attempt was made.
    #[error("Circuit breaker for '{dependency}' is open, call rejected")]
    RejectedByBreaker {
        /// Dependency whose breaker rejected the call.
        dependency: String,
    },

    /// The final attempt failed.
    #[error("Invocation failed: {0}")]
    Invocation(#[from] InvocationFailure),

    /// The final attempt exceeded its deadline.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// A fallback strategy was registered but produced no result.
    #[error("Fallback for '{dependency}' produced no result")]
    FallbackUnavailable {
        /// Dependency whose fallback came up empty.
        dependency: String,
        /// The failure that sent the call to the fallback.
        #[source]
        cause: Box<DispatchError>,
    },

    /// Primary and fallback paths are both exhausted. Terminal.
    #[error("Dependency '{dependency}' unavailable: {reason}")]
    DependencyUnavailable {
        /// Dependency that could not be reached.
        dependency: String,
        /// The failure that exhausted the primary path.
        #[source]
        reason: Box<DispatchError>,
    },

    /// No dependency registered under this name.
    #[error("No dependency registered as '{0}'")]
    UnknownDependency(String),

    /// No operation registered under this name for the dependency.
    #[error("No operation '{operation}' registered for dependency '{dependency}'")]
    UnknownOperation {
        /// Dependency the caller addressed.
        dependency: String,
        /// Operation name that was not found.
        operation: String,
    },
}

impl DispatchError {
    /// Check if this is a timeout error, directly or through the chain
    /// of underlying reasons.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::DependencyUnavailable { reason, .. } => reason.is_timeout(),
            Self::FallbackUnavailable { cause, .. } => cause.is_timeout(),
            _ => false,
        }
    }

    /// Get the invocation failure kind if one caused this error.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Invocation(f) => Some(f.kind),
            Self::DependencyUnavailable { reason, .. } => reason.failure_kind(),
            Self::FallbackUnavailable { cause, .. } => cause.failure_kind(),
            _ => None,
        }
    }

    /// Get the HTTP status code if a status failure caused this error.
    pub fn status_code(&self) -> Option<u16> {
        self.failure_kind().and_then(|k| k.status_code())
    }
}
