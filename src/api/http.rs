//! HTTP utilities for the supervisor REST API
//!
//! [`Exchange`] is the single-attempt I/O seam: it sends one request and
//! classifies transport-level failures. Retries, timeouts and body decoding
//! live one layer up in [`super::transport::Transport`].

use super::error::ApiError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Top-level JSON shape the caller expects back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Object,
    Array,
}

/// A labeled request against the API, relative to the server base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Short name used in logs ("list_vms", "vm_metrics", ...)
    pub label: &'static str,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub expect: Expect,
    /// Non-2xx statuses whose body is still the expected payload
    pub accepted: &'static [u16],
}

impl ApiRequest {
    pub fn new(label: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            label,
            method,
            path: path.into(),
            body: None,
            expect: Expect::Object,
            accepted: &[],
        }
    }

    pub fn get(label: &'static str, path: impl Into<String>) -> Self {
        Self::new(label, Method::Get, path)
    }

    pub fn post(label: &'static str, path: impl Into<String>) -> Self {
        Self::new(label, Method::Post, path)
    }

    pub fn delete(label: &'static str, path: impl Into<String>) -> Self {
        Self::new(label, Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn expect_array(mut self) -> Self {
        self.expect = Expect::Array;
        self
    }

    /// Decode the body of these error statuses instead of failing
    pub fn accepting(mut self, statuses: &'static [u16]) -> Self {
        self.accepted = statuses;
        self
    }
}

/// Status and raw body of one completed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs exactly one attempt of a request.
///
/// Implementations return `Ok` for any HTTP response, whatever its status, and
/// classify only failures to obtain one.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn send(&self, request: &ApiRequest, bearer: Option<&str>)
        -> Result<RawResponse, ApiError>;
}

/// reqwest-backed [`Exchange`]
#[derive(Clone)]
pub struct HttpExchange {
    client: Client,
    base_url: Url,
}

impl HttpExchange {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid server URL: {}", base_url))?;

        let client = Client::builder()
            .user_agent(concat!("kvmwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append an API path to the base URL, keeping any base path prefix
    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Map a reqwest failure onto the engine taxonomy
fn classify(error: &reqwest::Error) -> ApiError {
    if error.is_timeout() {
        // The transport enforces its own deadline; this only fires for
        // socket-level timeouts reported by the client itself.
        return ApiError::Connectivity(format!("connection timed out: {}", error));
    }
    if error.is_connect() || error.is_request() || error.is_body() {
        return ApiError::Connectivity(error.to_string());
    }
    ApiError::Unexpected(error.to_string())
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url_for(&request.path);
        tracing::debug!("{} {}", request.method.as_str(), url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Connectivity(format!("response interrupted: {}", e)))?;

        if !(200..300).contains(&status) {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
        }

        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(200)));
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("line1\nline2\t\u{7}"), "line1line2");
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = "é".repeat(150);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 300 bytes total]"));
    }

    #[test]
    fn test_url_for_keeps_base_prefix() {
        let exchange = HttpExchange::new("http://kvm.local:5000/api/").unwrap();
        assert_eq!(exchange.url_for("/vms"), "http://kvm.local:5000/api/vms");

        let exchange = HttpExchange::new("http://kvm.local:5000").unwrap();
        assert_eq!(
            exchange.url_for("/vm/alpha/metrics"),
            "http://kvm.local:5000/vm/alpha/metrics"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(HttpExchange::new("not a url").is_err());
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::get("list_snapshots", "/vm/a/snapshots").expect_array();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.expect, Expect::Array);

        let req = ApiRequest::post("stop_vm", "/vm/a/stop")
            .with_body(serde_json::json!({"force": true}));
        assert_eq!(req.body.unwrap()["force"], true);
        assert_eq!(req.expect, Expect::Object);
    }
}
