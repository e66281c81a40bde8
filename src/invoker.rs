//! Remote operation abstraction.
//!
//! A [`RemoteOperation`] performs one outbound call attempt. The
//! dispatcher owns retries, deadlines, and breaker bookkeeping, so
//! implementations must not retry internally.

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::error::InvocationFailure;

/// One attempt against a remote operation.
pub trait RemoteOperation: Send + Sync {
    /// Perform a single network call with the bound arguments.
    ///
    /// The returned future is owned so the dispatcher can run it as its
    /// own task and abandon it when the attempt deadline expires.
    fn invoke(&self, args: CallArgs) -> BoxFuture<'static, Result<Bytes, InvocationFailure>>;
}

/// Arguments bound to one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Result<Value, String>>,
}

impl CallArgs {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a path parameter, filling `{name}` in the operation's path
    /// template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the request body as JSON.
    ///
    /// A value that fails to serialize makes the call fail with a
    /// request-build failure at invocation time; it is never sent
    /// without the body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_value(body).map_err(|e| e.to_string()));
        self
    }

    /// Set the request body from a JSON value.
    pub fn json_value(mut self, body: Value) -> Self {
        self.body = Some(Ok(body));
        self
    }

    /// Get the bound path parameters.
    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// Get the query parameters.
    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Get the JSON body, if one was set and serialized cleanly.
    pub fn body(&self) -> Option<&Value> {
        match &self.body {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// Get the JSON body, failing if serialization failed when the body
    /// was bound. Transports must consult this before sending so a bad
    /// body becomes a request-build failure rather than a bodyless call.
    pub fn try_body(&self) -> Result<Option<&Value>, InvocationFailure> {
        match &self.body {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(InvocationFailure::request(format!(
                "body serialization failed: {}",
                e
            ))),
        }
    }
}

/// A [`RemoteOperation`] backed by a closure.
///
/// Useful for wiring in non-HTTP transports and for tests.
#[derive(Clone)]
pub struct OperationFn {
    f: Arc<dyn Fn(CallArgs) -> BoxFuture<'static, Result<Bytes, InvocationFailure>> + Send + Sync>,
}

impl OperationFn {
    /// Wrap a closure as a remote operation.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, InvocationFailure>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |args| Box::pin(f(args))),
        }
    }
}

impl RemoteOperation for OperationFn {
    fn invoke(&self, args: CallArgs) -> BoxFuture<'static, Result<Bytes, InvocationFailure>> {
        (self.f)(args)
    }
}

impl std::fmt::Debug for OperationFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_args_accumulate() {
        let args = CallArgs::new()
            .path_param("id", "42")
            .query("verbose", "true")
            .query("page", "2")
            .json(&serde_json::json!({"name": "widget"}));

        assert_eq!(args.path_params(), &[("id".to_string(), "42".to_string())]);
        assert_eq!(args.query_params().len(), 2);
        assert_eq!(args.body().unwrap()["name"], "widget");
        assert!(args.try_body().is_ok());
    }

    #[test]
    fn test_unserializable_body_is_a_request_failure() {
        // Non-string map keys cannot become a JSON object.
        let bad = std::collections::HashMap::from([((1u32, 2u32), "pair-keyed")]);
        let args = CallArgs::new().json(&bad);

        assert!(args.body().is_none());
        let err = args.try_body().unwrap_err();
        assert_eq!(err.kind, FailureKind::Request);
    }

    #[test]
    fn test_operation_fn_invokes_closure() {
        let op = OperationFn::new(|args: CallArgs| async move {
            let id = args.path_params()[0].1.clone();
            Ok(Bytes::from(format!("item-{}", id)))
        });

        let payload =
            tokio_test::block_on(op.invoke(CallArgs::new().path_param("id", "7"))).unwrap();
        assert_eq!(payload, Bytes::from_static(b"item-7"));
    }
}
