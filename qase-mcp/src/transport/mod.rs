//! Rate-limited transport.
//!
//! Sends [`ApiRequest`]s through an [`HttpSender`], spending one token of
//! the shared [`TokenBucket`] per attempt and applying the [`RetryPolicy`].
//! Every response that leaves [`Transport::send`] is a success; everything
//! else is already mapped into [`GatewayError`].

pub mod bucket;
pub mod http;
pub mod retry;

pub use bucket::TokenBucket;
pub use http::ReqwestSender;
pub use retry::RetryPolicy;

use crate::error::{GatewayError, GatewayResult};
use crate::health::MetricsCollector;
use crate::request::ApiRequest;
use async_trait::async_trait;
use retry::{Failure, RetryBudget};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, warn};

/// Longest backend message carried into an error.
const MAX_MESSAGE_LEN: usize = 500;

/// Failure to obtain any HTTP response.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The connection could not be established; nothing was sent.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl SendError {
    /// Whether the request provably never reached the backend.
    pub fn is_pre_send(&self) -> bool {
        matches!(self, SendError::Connect(_))
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Headers with lowercase names.
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Response with a text body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Response with a JSON body.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Classify the status code.
    pub fn class(&self) -> ResponseClass {
        ResponseClass::of(self.status)
    }

    /// Parse the body as JSON; an empty body parses as `null`.
    pub fn json_body(&self) -> GatewayResult<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|e| GatewayError::unexpected_response(self.status, format!("invalid JSON: {}", e)))
    }

    /// Human-readable error message from a Qase error body.
    ///
    /// Uses `errorMessage` (plus any `errorFields`) when present, otherwise
    /// the raw body.
    pub fn error_message(&self) -> String {
        let parsed: Option<Value> = serde_json::from_str(&self.body).ok();
        let message = parsed.as_ref().and_then(|body| {
            let main = ["errorMessage", "message", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str))?;
            let fields: Vec<String> = body
                .get("errorFields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(|field| {
                            Some(format!(
                                "{}: {}",
                                field.get("field")?.as_str()?,
                                field.get("error")?.as_str()?
                            ))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(if fields.is_empty() {
                main.to_string()
            } else {
                format!("{} ({})", main, fields.join("; "))
            })
        });

        let message = match message {
            Some(message) => message,
            None if self.body.trim().is_empty() => format!("HTTP {}", self.status),
            None => self.body.trim().to_string(),
        };
        truncate(message)
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push('…');
    }
    message
}

/// Status code classes the transport treats differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx (and anything below 400 that is not an error).
    Success,
    /// 429.
    RateLimited,
    /// Other 4xx.
    ClientError,
    /// 5xx.
    ServerError,
}

impl ResponseClass {
    /// Class of a status code.
    pub fn of(status: u16) -> Self {
        match status {
            429 => ResponseClass::RateLimited,
            400..=499 => ResponseClass::ClientError,
            500..=599 => ResponseClass::ServerError,
            _ => ResponseClass::Success,
        }
    }
}

/// Sends one HTTP request and returns whatever came back.
#[async_trait]
pub trait HttpSender: Send + Sync + std::fmt::Debug {
    /// Perform a single attempt.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, SendError>;
}

/// Rate-limited, retrying transport.
#[derive(Debug, Clone)]
pub struct Transport {
    sender: Arc<dyn HttpSender>,
    bucket: Arc<TokenBucket>,
    policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl Transport {
    /// Create a transport.
    pub fn new(
        sender: Arc<dyn HttpSender>,
        bucket: Arc<TokenBucket>,
        policy: RetryPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            sender,
            bucket,
            policy,
            metrics,
        }
    }

    /// Shared token bucket.
    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    /// Retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Metrics sink.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Send a request, retrying as the policy allows.
    ///
    /// Every retry repeats the identical request.
    #[instrument(
        skip(self, request),
        fields(method = request.method.as_str(), url = %request.url, api = request.api_version.as_str())
    )]
    pub async fn send(&self, request: &ApiRequest) -> GatewayResult<ApiResponse> {
        let mut budget = RetryBudget::default();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.bucket.acquire().await;

            let started = Instant::now();
            let outcome = self.sender.send(request).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let (failure, err) = match outcome {
                Ok(response) => match response.class() {
                    ResponseClass::Success => {
                        self.metrics.record_request(request.api_version, latency_ms, true);
                        debug!(attempt, status = response.status, latency_ms, "Request succeeded");
                        return Ok(response);
                    }
                    ResponseClass::ClientError => {
                        self.metrics.record_request(request.api_version, latency_ms, false);
                        let message = response.error_message();
                        debug!(attempt, status = response.status, %message, "Request rejected");
                        return Err(GatewayError::UpstreamClient {
                            status: response.status,
                            message,
                        });
                    }
                    ResponseClass::RateLimited => {
                        self.metrics.record_request(request.api_version, latency_ms, false);
                        self.metrics.record_rate_limited();
                        let retry_after = self.policy.retry_after(response.header("retry-after"));
                        (
                            Failure::RateLimited { retry_after },
                            GatewayError::RateLimited { retry_after },
                        )
                    }
                    ResponseClass::ServerError => {
                        self.metrics.record_request(request.api_version, latency_ms, false);
                        (
                            Failure::Server,
                            GatewayError::UpstreamServer {
                                status: response.status,
                                message: response.error_message(),
                            },
                        )
                    }
                },
                Err(send_error) => {
                    self.metrics.record_request(request.api_version, latency_ms, false);
                    (
                        Failure::Network {
                            pre_send: send_error.is_pre_send(),
                        },
                        GatewayError::network(send_error.to_string()),
                    )
                }
            };

            match self.policy.decide(&mut budget, failure, request.idempotent) {
                Some(delay) => {
                    self.metrics.record_retry();
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
                None => {
                    if budget.total() > 0 {
                        error!(attempts = attempt, error = %err, "All retry attempts exhausted");
                    } else {
                        warn!(attempt, error = %err, "Request failed");
                    }
                    return Err(err);
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{transport, ScriptedSender};
    use super::*;
    use crate::registry::{ApiVersion, HttpMethod};
    use crate::request::RequestBody;
    use serde_json::json;
    use std::time::Duration;

    fn request(method: HttpMethod) -> ApiRequest {
        ApiRequest {
            method,
            api_version: ApiVersion::V1,
            url: "https://api.qase.io/v1/project".to_string(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            idempotent: method.is_idempotent(),
        }
    }

    fn ok() -> Result<ApiResponse, SendError> {
        Ok(ApiResponse::json(200, &json!({"status": true, "result": {}})))
    }

    #[test]
    fn test_classify() {
        assert_eq!(ResponseClass::of(200), ResponseClass::Success);
        assert_eq!(ResponseClass::of(204), ResponseClass::Success);
        assert_eq!(ResponseClass::of(404), ResponseClass::ClientError);
        assert_eq!(ResponseClass::of(429), ResponseClass::RateLimited);
        assert_eq!(ResponseClass::of(503), ResponseClass::ServerError);
    }

    #[test]
    fn test_error_message_extraction() {
        let response = ApiResponse::json(
            422,
            &json!({"status": false, "errorMessage": "Data is invalid.", "errorFields": [{"field": "title", "error": "Title is required."}]}),
        );
        assert_eq!(response.error_message(), "Data is invalid. (title: Title is required.)");

        assert_eq!(ApiResponse::new(502, "Bad Gateway").error_message(), "Bad Gateway");
        assert_eq!(ApiResponse::new(500, "").error_message(), "HTTP 500");
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_waits_retry_after_then_succeeds() {
        let sender = ScriptedSender::sequence(vec![
            Ok(ApiResponse::new(429, "").with_header("Retry-After", "7")),
            ok(),
        ]);
        let transport = transport(sender.clone(), RetryPolicy::default());

        let response = transport.send(&request(HttpMethod::Post)).await.unwrap();
        assert_eq!(response.status, 200);

        let times = sender.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(7));
        assert_eq!(sender.calls()[0], sender.calls()[1]);

        let metrics = transport.metrics().snapshot();
        assert_eq!(metrics.v1_requests, 2);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.rate_limited_responses, 1);
        assert!((metrics.success_rate - 0.5).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_429_surfaces_rate_limited() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::new(429, ""))]);
        let transport = transport(sender.clone(), RetryPolicy::default());

        let start = Instant::now();
        let err = transport.send(&request(HttpMethod::Get)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { retry_after } if retry_after == Duration::from_secs(60)));
        assert_eq!(sender.call_count(), 2);
        assert!(start.elapsed() >= Duration::from_secs(60));
        let metrics = transport.metrics().snapshot();
        assert_eq!(metrics.rate_limited_responses, 2);
        assert_eq!(metrics.v1_requests, 2);
        assert_eq!(metrics.failed_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_not_retried() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::json(
            404,
            &json!({"status": false, "errorMessage": "Project not found"}),
        ))]);
        let transport = transport(sender.clone(), RetryPolicy::fast());

        let err = transport.send(&request(HttpMethod::Get)).await.unwrap_err();
        match err {
            GatewayError::UpstreamClient { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Project not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retried_once_when_idempotent() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::new(503, "unavailable"))]);
        let transport = transport(sender.clone(), RetryPolicy::fast());
        let err = transport.send(&request(HttpMethod::Get)).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamServer { status: 503, .. }));
        assert_eq!(sender.call_count(), 2);

        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::new(503, "")), ok()]);
        let transport = super::testing::transport(sender.clone(), RetryPolicy::fast());
        assert!(transport.send(&request(HttpMethod::Patch)).await.is_ok());
        assert_eq!(sender.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_idempotent_post_not_retried_after_5xx() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::new(500, "boom")), ok()]);
        let transport = transport(sender.clone(), RetryPolicy::fast());
        let err = transport.send(&request(HttpMethod::Post)).await.unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamServer { status: 500, .. }));
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_use_backoff_budget() {
        let sender = ScriptedSender::sequence(vec![Err(SendError::Timeout("slow".into()))]);
        let transport = transport(sender.clone(), RetryPolicy::fast());
        let err = transport.send(&request(HttpMethod::Get)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NetworkFailure { .. }));
        assert_eq!(sender.call_count(), 3);

        let times = sender.call_times();
        assert!(times[1] - times[0] >= Duration::from_millis(10));
        assert!(times[2] - times[1] >= Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_retried_only_for_pre_send_failures() {
        let sender = ScriptedSender::sequence(vec![Err(SendError::Timeout("slow".into())), ok()]);
        let transport = transport(sender.clone(), RetryPolicy::fast());
        assert!(transport.send(&request(HttpMethod::Post)).await.is_err());
        assert_eq!(sender.call_count(), 1);

        let sender = ScriptedSender::sequence(vec![Err(SendError::Connect("refused".into())), ok()]);
        let transport = super::testing::transport(sender.clone(), RetryPolicy::fast());
        assert!(transport.send(&request(HttpMethod::Post)).await.is_ok());
        assert_eq!(sender.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_spends_a_token() {
        let sender = ScriptedSender::sequence(vec![Ok(ApiResponse::new(503, ""))]);
        let bucket = Arc::new(TokenBucket::new(crate::config::RateLimitConfig {
            per_minute: 60,
            burst: 5,
        }));
        let transport = Transport::new(
            sender.clone(),
            bucket.clone(),
            RetryPolicy::fast(),
            Arc::new(MetricsCollector::new()),
        );
        let _ = transport.send(&request(HttpMethod::Get)).await;
        assert_eq!(sender.call_count(), 2);
        assert_eq!(bucket.available().await, 3);
    }
}
