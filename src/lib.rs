//! # Contactor
//!
//! Resilient dispatch for outbound remote calls: one circuit breaker
//! per dependency, deadline-bounded attempts with bounded retry, and
//! fallback strategies, composed behind a single `call` entry point.
//!
//! ## Features
//!
//! - **Per-Dependency Circuit Breakers**: failure-rate sliding window
//!   with Closed / Open / Half-Open transitions and bounded trial batches
//! - **Timeouts & Retry**: per-attempt deadlines and configurable backoff
//!   (constant, exponential, or an explicit schedule)
//! - **Fallbacks**: fixed values, last-known-good replay, or computed
//!   payloads when the primary path is unavailable
//! - **Declared Operations**: an explicit trait per remote operation,
//!   with an HTTP adapter built on reqwest
//! - **Outcome Events**: one fire-and-forget event per call for metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contactor::{CallArgs, DependencyConfig, Dispatcher, HttpTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = HttpTarget::builder("http://localhost:8080/api/v1/callee").build()?;
//!
//!     let dispatcher = Dispatcher::builder()
//!         .dependency(DependencyConfig::new("callee-v1").operation("hello", target.get("/hello")))
//!         .build();
//!
//!     let result = dispatcher.call("callee-v1", "hello", CallArgs::new()).await?;
//!     println!("primary: {}", result.is_primary());
//!     Ok(())
//! }
//! ```
//!
//! ## With Breaker, Retry, and Fallback
//!
//! ```rust,no_run
//! use contactor::{
//!     BreakerConfig, CallArgs, DependencyConfig, Dispatcher, Fallback, HttpTarget, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let target = HttpTarget::builder("http://localhost:8080/api/v1/callee").build()?;
//!
//!     let dispatcher = Dispatcher::builder()
//!         .dependency(
//!             DependencyConfig::new("callee-v1")
//!                 .breaker(
//!                     BreakerConfig::default()
//!                         .failure_rate_threshold(0.5)
//!                         .min_samples(10)
//!                         .open_duration(Duration::from_secs(10)),
//!                 )
//!                 .retry(RetryPolicy::constant(3, Duration::from_millis(500)))
//!                 .attempt_timeout(Duration::from_secs(2))
//!                 .fallback(Fallback::json(serde_json::json!({"message": "degraded"})))
//!                 .operation("hello", target.get("/hello"))
//!                 .operation("wait", target.get("/timeout/{seconds}")),
//!         )
//!         .build();
//!
//!     // The breaker opens after sustained failures; the fallback
//!     // answers while the dependency recovers.
//!     let result = dispatcher
//!         .call("callee-v1", "wait", CallArgs::new().path_param("seconds", "1"))
//!         .await?;
//!
//!     println!("attempts: {}", result.attempts());
//!     Ok(())
//! }
//! ```

mod breaker;
mod config;
mod dispatcher;
mod error;
mod events;
mod fallback;
mod http;
mod invoker;
mod outcome;
mod retry;

pub use breaker::{AdmitDecision, BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use config::{CallOptions, DependencyConfig};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, FailureKind, InvocationFailure, Result};
pub use events::{CallEvent, EventSink, Resolution, TracingEventSink};
pub use fallback::{Fallback, FallbackFn};
pub use http::{HttpOperation, HttpTarget, HttpTargetBuilder};
pub use invoker::{CallArgs, OperationFn, RemoteOperation};
pub use outcome::{CallOutcome, CallResult, FailureReason, Provenance};
pub use retry::{BackoffStrategy, RetryPolicy};

// Re-export common types
pub use ::http::Method;
pub use bytes::Bytes;

/// Prelude for common imports.
///
/// ```
/// use contactor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
    pub use crate::config::{CallOptions, DependencyConfig};
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    pub use crate::error::{DispatchError, FailureKind, InvocationFailure, Result};
    pub use crate::events::{CallEvent, EventSink, Resolution, TracingEventSink};
    pub use crate::fallback::Fallback;
    pub use crate::http::{HttpOperation, HttpTarget};
    pub use crate::invoker::{CallArgs, OperationFn, RemoteOperation};
    pub use crate::outcome::{CallOutcome, CallResult, FailureReason, Provenance};
    pub use crate::retry::{BackoffStrategy, RetryPolicy};
    pub use ::http::Method;
}
