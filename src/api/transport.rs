//! Resilient transport
//!
//! Wraps an [`Exchange`] with the request timeout, the linear-backoff retry
//! loop, the bearer credential and JSON shape decoding.

use super::error::ApiError;
use super::http::{ApiRequest, Exchange, Expect, RawResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

/// Immutable retry configuration, applied to every request of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt; `max_retries + 1` attempts at most
    pub max_retries: u32,
    /// Backoff after the n-th failed attempt is `n * backoff_unit`
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.backoff_unit * attempts
    }
}

/// Transport shared by every client call
#[derive(Clone)]
pub struct Transport {
    exchange: Arc<dyn Exchange>,
    policy: RetryPolicy,
    token: Arc<RwLock<Option<String>>>,
}

impl Transport {
    pub fn new(exchange: Arc<dyn Exchange>, policy: RetryPolicy) -> Self {
        Self {
            exchange,
            policy,
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Install or clear the bearer credential
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Issue a request under the retry policy
    pub async fn request(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let span = tracing::debug_span!(
            "request",
            id = %Uuid::new_v4(),
            label = request.label,
            method = request.method.as_str(),
            path = %request.path,
        );
        self.request_with_retry(request).instrument(span).await
    }

    /// Issue a request exactly once, bypassing the retry loop
    pub async fn request_once(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let span = tracing::debug_span!(
            "request",
            id = %Uuid::new_v4(),
            label = request.label,
            method = request.method.as_str(),
            path = %request.path,
        );
        async {
            let token = self.token.read().await.clone();
            self.attempt(request, token.as_deref()).await
        }
        .instrument(span)
        .await
    }

    async fn request_with_retry(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let token = self.token.read().await.clone();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.attempt(request, token.as_deref()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempts <= self.policy.max_retries => {
                    let delay = self.policy.backoff(attempts);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}, retrying in {:?}",
                        request.label,
                        attempts,
                        self.policy.max_retries + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!(
                            "{} gave up after {} attempts: {}",
                            request.label,
                            attempts,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: &ApiRequest, token: Option<&str>) -> Result<Value, ApiError> {
        let raw = tokio::time::timeout(self.policy.timeout, self.exchange.send(request, token))
            .await
            .map_err(|_| ApiError::Timeout(self.policy.timeout))??;

        decode(raw, request.expect, request.accepted)
    }
}

/// Turn a completed exchange into the expected JSON payload
fn decode(raw: RawResponse, expect: Expect, accepted: &[u16]) -> Result<Value, ApiError> {
    if !raw.is_success() && !accepted.contains(&raw.status) {
        return Err(ApiError::Application {
            status: raw.status,
            message: error_message(&raw.body)
                .unwrap_or_else(|| format!("server error (code {})", raw.status)),
        });
    }

    let value: Value = serde_json::from_str(&raw.body)
        .map_err(|e| ApiError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    match (expect, &value) {
        (Expect::Object, Value::Object(_)) | (Expect::Array, Value::Array(_)) => Ok(value),
        (Expect::Object, _) => Err(ApiError::MalformedResponse(
            "expected a JSON object".to_string(),
        )),
        (Expect::Array, _) => Err(ApiError::MalformedResponse(
            "expected a JSON array".to_string(),
        )),
    }
}

/// Best-effort message from an error body: `message`, then `msg`
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
