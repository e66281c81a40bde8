//! HTTP adapter for remote operations.
//!
//! An [`HttpTarget`] holds the shared connection pool and base URL for
//! one remote service. [`HttpOperation`]s bind a method and path
//! template to the target and implement
//! [`RemoteOperation`](crate::RemoteOperation), one per declared remote
//! endpoint.
//!
//! Operations perform exactly one request per `invoke` and carry no
//! overall request timeout; retries and attempt deadlines belong to the
//! dispatcher.
//!
//! ## Example
//!
//! ```rust,ignore
//! use contactor::{CallArgs, HttpTarget};
//!
//! let target = HttpTarget::builder("http://localhost:8080/api/v1/callee")
//!     .default_header("Accept", "application/json")
//!     .build()?;
//!
//! let hello = target.get("/hello");
//! let wait = target.get("/timeout/{seconds}");
//! // wait.invoke(CallArgs::new().path_param("seconds", "3"))
//! ```

use bytes::Bytes;
use futures::future::BoxFuture;
use http::Method;
use std::time::Duration;
use url::Url;

use crate::error::InvocationFailure;
use crate::invoker::{CallArgs, RemoteOperation};

/// Shared HTTP client and base URL for one remote service.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: reqwest::Client,
    base_url: String,
    default_headers: Vec<(String, String)>,
}

impl HttpTarget {
    /// Create a builder for the given base URL.
    pub fn builder(base_url: impl Into<String>) -> HttpTargetBuilder {
        HttpTargetBuilder::new(base_url)
    }

    /// Create a GET operation for the given path template.
    pub fn get(&self, path: impl Into<String>) -> HttpOperation {
        self.operation(Method::GET, path)
    }

    /// Create a POST operation for the given path template.
    pub fn post(&self, path: impl Into<String>) -> HttpOperation {
        self.operation(Method::POST, path)
    }

    /// Create a PUT operation for the given path template.
    pub fn put(&self, path: impl Into<String>) -> HttpOperation {
        self.operation(Method::PUT, path)
    }

    /// Create a DELETE operation for the given path template.
    pub fn delete(&self, path: impl Into<String>) -> HttpOperation {
        self.operation(Method::DELETE, path)
    }

    /// Create an operation with a custom method. The path template may
    /// contain `{name}` placeholders bound from
    /// [`CallArgs::path_param`].
    pub fn operation(&self, method: Method, path: impl Into<String>) -> HttpOperation {
        HttpOperation {
            client: self.client.clone(),
            method,
            url_template: join_url(&self.base_url, &path.into()),
            headers: self.default_headers.clone(),
            expect_json: true,
        }
    }
}

/// Builder for [`HttpTarget`].
#[derive(Debug)]
pub struct HttpTargetBuilder {
    base_url: String,
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    default_headers: Vec<(String, String)>,
    user_agent: String,
    gzip: bool,
    brotli: bool,
}

impl HttpTargetBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            default_headers: Vec::new(),
            user_agent: format!("contactor/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
        }
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Add a header sent with every operation on this target.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip response decompression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.gzip = enable;
        self
    }

    /// Enable or disable brotli response decompression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.brotli = enable;
        self
    }

    /// Build the target, validating the base URL.
    pub fn build(self) -> crate::Result<HttpTarget> {
        Url::parse(&self.base_url)
            .map_err(|e| InvocationFailure::request(format!("invalid base URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(&self.user_agent)
            .gzip(self.gzip)
            .brotli(self.brotli)
            .build()
            .map_err(|e| InvocationFailure::request(format!("client build failed: {}", e)))?;

        Ok(HttpTarget {
            client,
            base_url: self.base_url,
            default_headers: self.default_headers,
        })
    }
}

/// One HTTP endpoint bound to a target.
#[derive(Debug, Clone)]
pub struct HttpOperation {
    client: reqwest::Client,
    method: Method,
    url_template: String,
    headers: Vec<(String, String)>,
    expect_json: bool,
}

impl HttpOperation {
    /// Add a header sent with this operation only.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Skip JSON validation of successful response bodies.
    pub fn raw(mut self) -> Self {
        self.expect_json = false;
        self
    }
}

impl RemoteOperation for HttpOperation {
    fn invoke(&self, args: CallArgs) -> BoxFuture<'static, Result<Bytes, InvocationFailure>> {
        let client = self.client.clone();
        let method = self.method.clone();
        let template = self.url_template.clone();
        let headers = self.headers.clone();
        let expect_json = self.expect_json;

        Box::pin(async move {
            let url = build_url(&template, &args)?;

            let mut request = client.request(method, url);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = args.try_body()? {
                request = request.json(body);
            }

            let response = request.send().await.map_err(map_reqwest_error)?;
            read_response(response, expect_json).await
        })
    }
}

/// Join a base URL and a path segment without losing the base path.
fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.trim_end_matches('/').to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

/// Fill `{name}` placeholders and append query parameters.
fn build_url(template: &str, args: &CallArgs) -> Result<Url, InvocationFailure> {
    let mut rendered = template.to_string();
    for (name, value) in args.path_params() {
        rendered = rendered.replace(&format!("{{{}}}", name), value);
    }
    if rendered.contains('{') {
        return Err(InvocationFailure::request(format!(
            "unresolved path parameter in '{}'",
            rendered
        )));
    }

    let mut url = Url::parse(&rendered)
        .map_err(|e| InvocationFailure::request(format!("invalid URL '{}': {}", rendered, e)))?;

    if !args.query_params().is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in args.query_params() {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

fn map_reqwest_error(e: reqwest::Error) -> InvocationFailure {
    if e.is_builder() {
        InvocationFailure::request(e.to_string())
    } else {
        InvocationFailure::network(e.to_string())
    }
}

async fn read_response(
    response: reqwest::Response,
    expect_json: bool,
) -> Result<Bytes, InvocationFailure> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| InvocationFailure::network(e.to_string()))?;

    if !status.is_success() {
        return Err(InvocationFailure::status(
            status.as_u16(),
            body_excerpt(&body),
        ));
    }

    if expect_json
        && !body.is_empty()
        && let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&body)
    {
        return Err(InvocationFailure::deserialize(e.to_string()));
    }

    Ok(body)
}

fn body_excerpt(body: &Bytes) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX {
        let head: String = text.chars().take(MAX).collect();
        format!("{}...", head)
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_join_keeps_base_path() {
        assert_eq!(
            join_url("http://localhost:8080/api/v1/callee", "/hello"),
            "http://localhost:8080/api/v1/callee/hello"
        );
        assert_eq!(
            join_url("http://localhost:8080/api/v1/callee/", "hello"),
            "http://localhost:8080/api/v1/callee/hello"
        );
        assert_eq!(
            join_url("http://localhost:8080/api", ""),
            "http://localhost:8080/api"
        );
    }

    #[test]
    fn test_build_url_substitutes_path_params() {
        let url = build_url(
            "http://localhost/timeout/{seconds}",
            &CallArgs::new().path_param("seconds", "3"),
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://localhost/timeout/3");
    }

    #[test]
    fn test_build_url_appends_query() {
        let url = build_url(
            "http://localhost/items",
            &CallArgs::new().query("page", "2").query("verbose", "true"),
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://localhost/items?page=2&verbose=true");
    }

    #[test]
    fn test_unresolved_path_param_is_a_request_failure() {
        let err = build_url("http://localhost/items/{id}", &CallArgs::new()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Request);
    }

    #[test]
    fn test_invalid_base_url_rejected_at_build() {
        let err = HttpTarget::builder("not a url").build().unwrap_err();
        assert_eq!(err.failure_kind(), Some(FailureKind::Request));
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let body = Bytes::from(vec![b'x'; 500]);
        let excerpt = body_excerpt(&body);
        assert!(excerpt.len() <= 203);
        assert!(excerpt.ends_with("..."));
    }
}
