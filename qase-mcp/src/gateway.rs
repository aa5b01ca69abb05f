//! Tool gateway façade.
//!
//! The single entry point the MCP host talks to. One invocation is:
//!
//! 1. resolve the tool name in the [`EndpointRegistry`]
//! 2. validate the arguments against the tool's schema
//! 3. build the [`ApiRequest`]
//! 4. execute it according to the tool's [`ToolMode`]
//! 5. drop stale reference data listed in the invalidation table
//!
//! Every failure leaves as a [`GatewayError`]; [`ToolGateway::invoke_envelope`]
//! wraps the outcome into the stable `{"toolResult": ...}` /
//! `{"error": {...}}` document.

use crate::bulk::{BulkBatcher, BulkReport};
use crate::cache::{CacheKey, ReferenceCache};
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::health::{GatewayMetrics, HealthCheckConfig, HealthChecker, MetricsCollector};
use crate::pagination::{Collected, Paginator};
use crate::registry::catalog::invalidations_for;
use crate::registry::{
    EndpointRegistry, InvalidationScope, ResultShape, ToolDescriptor, ToolMode, ValidatedArguments,
};
use crate::request::{ApiRequest, RequestBuilder};
use crate::transport::{HttpSender, ReqwestSender, TokenBucket, Transport};
use crate::types::{ToolCall, ToolDefinition, ToolResult};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Tool used as the readiness probe.
const PROBE_TOOL: &str = "qase_list_projects";

/// One tool call: a name and its raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Tool name.
    pub tool_name: String,
    /// Raw arguments.
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    /// Invocation from a name and a JSON object; anything else means no arguments.
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

impl From<ToolCall> for ToolInvocation {
    fn from(call: ToolCall) -> Self {
        Self {
            tool_name: call.name,
            arguments: call.arguments,
        }
    }
}

/// Successful invocation result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Tool that produced it.
    pub tool: &'static str,
    /// Normalized result.
    pub result: Value,
}

/// Index and kind of one failed bulk item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedItem {
    /// Index in the caller's input.
    pub index: usize,
    /// Error kind.
    pub kind: ErrorKind,
}

/// Error half of a [`ToolEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Offending argument for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Backend status code for upstream errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Seconds to wait for rate-limit errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Failed items of a partial bulk failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_items: Option<Vec<FailedItem>>,
    /// Every item outcome of a partial bulk failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BulkReport>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        let mut body = ErrorBody {
            kind: err.kind(),
            message: err.to_string(),
            field: None,
            status: None,
            retry_after_secs: None,
            failed_items: None,
            report: None,
        };
        match err {
            GatewayError::Validation { field, .. } => body.field = Some(field.clone()),
            GatewayError::RateLimited { retry_after } => {
                body.retry_after_secs = Some(retry_after.as_secs())
            }
            GatewayError::UpstreamClient { status, .. }
            | GatewayError::UpstreamServer { status, .. } => body.status = Some(*status),
            GatewayError::PartialBulkFailure { report } => {
                body.failed_items = Some(
                    report
                        .failed_items()
                        .into_iter()
                        .map(|(index, kind)| FailedItem { index, kind })
                        .collect(),
                );
                body.report = Some(report.clone());
            }
            GatewayError::NotFoundTool(_) | GatewayError::NetworkFailure { .. } => {}
        }
        body
    }
}

/// Stable outcome document handed back to the MCP host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ToolEnvelope {
    /// `{"toolResult": ...}`
    #[serde(rename = "toolResult")]
    ToolResult(Value),
    /// `{"error": {...}}`
    #[serde(rename = "error")]
    Error(ErrorBody),
}

impl ToolEnvelope {
    /// Wrap an invocation outcome.
    pub fn from_outcome(outcome: &GatewayResult<ToolOutput>) -> Self {
        match outcome {
            Ok(output) => ToolEnvelope::ToolResult(output.result.clone()),
            Err(err) => ToolEnvelope::Error(ErrorBody::from(err)),
        }
    }

    /// Whether this is an error envelope.
    pub fn is_error(&self) -> bool {
        matches!(self, ToolEnvelope::Error(_))
    }

    /// JSON form.
    pub fn to_value(&self) -> Value {
        match self {
            ToolEnvelope::ToolResult(result) => json!({ "toolResult": result }),
            ToolEnvelope::Error(body) => json!({
                "error": serde_json::to_value(body)
                    .unwrap_or_else(|_| json!({"kind": body.kind, "message": body.message}))
            }),
        }
    }

    /// MCP tool result carrying the envelope as JSON text.
    pub fn into_tool_result(self) -> ToolResult {
        ToolResult::json(&self.to_value(), self.is_error())
    }
}

/// Qase tool gateway.
#[derive(Debug, Clone)]
pub struct ToolGateway {
    config: GatewayConfig,
    registry: Arc<EndpointRegistry>,
    builder: RequestBuilder,
    transport: Transport,
    batcher: BulkBatcher,
    cache: ReferenceCache,
    probe: ApiRequest,
}

impl ToolGateway {
    /// Gateway talking to Qase over HTTP.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sender = ReqwestSender::new(config.timeout())?;
        Self::with_sender(config, Arc::new(sender))
    }

    /// Gateway using a custom [`HttpSender`].
    pub fn with_sender(config: GatewayConfig, sender: Arc<dyn HttpSender>) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::new());
        let bucket = Arc::new(TokenBucket::new(config.rate_limit));
        let transport = Transport::new(sender, bucket, config.retry.clone(), metrics.clone());
        let builder = RequestBuilder::new(config.endpoints.clone(), config.api_token.clone());
        let registry = Arc::new(EndpointRegistry::qase());
        let batcher = BulkBatcher::new(transport.clone(), builder.clone(), config.bulk_chunk_ceiling);
        let cache = ReferenceCache::new(metrics);

        let probe = registry
            .resolve(PROBE_TOOL)
            .and_then(|descriptor| builder.build(descriptor, &ValidatedArguments::default()))
            .map(|request| request.with_page(1, 0))
            .map_err(|e| ConfigError::InvalidValue {
                key: "QASE_API_URL".to_string(),
                message: e.to_string(),
            })?;

        info!(
            tools = registry.len(),
            v1 = %config.endpoints.v1,
            v2 = %config.endpoints.v2,
            "Qase tool gateway initialized"
        );

        Ok(Self {
            config,
            registry,
            builder,
            transport,
            batcher,
            cache,
            probe,
        })
    }

    /// Definitions of every tool, for the MCP catalog.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Tool registry.
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Reference-data cache.
    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    /// Current request metrics.
    pub fn metrics(&self) -> GatewayMetrics {
        self.transport.metrics().snapshot()
    }

    /// Health checker sharing this gateway's transport.
    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::new(
            self.transport.clone(),
            self.probe.clone(),
            HealthCheckConfig::default(),
        )
    }

    /// Run one tool invocation.
    #[instrument(
        skip(self, invocation),
        fields(tool = %invocation.tool_name, invocation_id = %Uuid::now_v7())
    )]
    pub async fn invoke(&self, invocation: ToolInvocation) -> GatewayResult<ToolOutput> {
        let descriptor = self.registry.resolve(&invocation.tool_name)?;
        let args = self.registry.validate(descriptor, &invocation.arguments)?;
        let request = self.builder.build(descriptor, &args)?;
        debug!(method = request.method.as_str(), url = %request.url, "Built request");

        let outcome = match descriptor.mode {
            ToolMode::Single => self.run_single(descriptor, &request).await,
            ToolMode::List => self.run_list(&request, &args).await,
            ToolMode::Bulk { items_arg, .. } => {
                self.run_bulk(descriptor, &request, &args, items_arg).await
            }
            ToolMode::Reference { endpoint, paginated } => {
                self.run_reference(descriptor, &request, &args, endpoint, paginated)
                    .await
            }
        };

        if descriptor.method.is_mutating() {
            self.apply_invalidations(descriptor, &args).await;
        }

        match &outcome {
            Ok(_) => info!("Tool call completed"),
            Err(err) => warn!(kind = %err.kind(), error = %err, "Tool call failed"),
        }

        outcome.map(|result| ToolOutput {
            tool: descriptor.name,
            result,
        })
    }

    /// Run an invocation and wrap the outcome in a [`ToolEnvelope`].
    pub async fn invoke_envelope(&self, invocation: ToolInvocation) -> ToolEnvelope {
        ToolEnvelope::from_outcome(&self.invoke(invocation).await)
    }

    /// Run an MCP tool call.
    pub async fn call(&self, call: ToolCall) -> ToolResult {
        self.invoke_envelope(call.into()).await.into_tool_result()
    }

    async fn run_single(&self, descriptor: &ToolDescriptor, request: &ApiRequest) -> GatewayResult<Value> {
        let response = self.transport.send(request).await?;
        let body = response.json_body()?;
        normalize(descriptor.result_shape, response.status, body)
    }

    async fn run_list(&self, request: &ApiRequest, args: &ValidatedArguments) -> GatewayResult<Value> {
        let collected = Paginator::new(
            self.transport.clone(),
            request.clone(),
            args.get_u64("limit").unwrap_or(self.config.page_size),
        )
        .starting_at(args.get_u64("offset").unwrap_or(0))
        .max_results(args.get_u64("max_results"))
        .collect()
        .await?;
        Ok(collected.into_value())
    }

    async fn run_bulk(
        &self,
        descriptor: &ToolDescriptor,
        request: &ApiRequest,
        args: &ValidatedArguments,
        items_arg: &str,
    ) -> GatewayResult<Value> {
        let items = args
            .get(items_arg)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let report = self.batcher.execute(descriptor, request, items).await;
        report.into_result().map(|report| report.to_value())
    }

    async fn run_reference(
        &self,
        descriptor: &ToolDescriptor,
        request: &ApiRequest,
        args: &ValidatedArguments,
        endpoint: &'static str,
        paginated: bool,
    ) -> GatewayResult<Value> {
        let ttl = descriptor.cache_ttl.unwrap_or_else(|| self.config.cache_ttl());
        let key = CacheKey::new(
            descriptor.api_version,
            endpoint,
            args.get_str("project_code").map(str::to_string),
        )
        .with_variant(variant_of(request));

        if paginated {
            let all = self
                .cache
                .get_or_fetch(key, ttl, || async {
                    Paginator::new(self.transport.clone(), request.clone(), self.config.page_size)
                        .collect()
                        .await
                        .map(Collected::into_value)
                })
                .await?;
            Ok(limit_entities(all, args.get_u64("max_results")))
        } else {
            self.cache
                .get_or_fetch(key, ttl, || self.run_single(descriptor, request))
                .await
        }
    }

    async fn apply_invalidations(&self, descriptor: &ToolDescriptor, args: &ValidatedArguments) {
        for row in invalidations_for(descriptor.name) {
            let project = match row.scope {
                InvalidationScope::Project => args.get_str("project_code"),
                InvalidationScope::Endpoint => None,
            };
            self.cache.invalidate_endpoint(row.endpoint, project).await;
        }
    }
}

/// Cache variant of a request: its URL and query.
fn variant_of(request: &ApiRequest) -> String {
    let query: Vec<String> = request
        .query
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("{}?{}", request.url, query.join("&"))
}

/// Apply `max_results` to a cached entity list.
fn limit_entities(mut value: Value, max_results: Option<u64>) -> Value {
    if let Some(max) = max_results {
        if let Some(entities) = value.get_mut("entities").and_then(Value::as_array_mut) {
            entities.truncate(max as usize);
            let count = entities.len();
            value["count"] = json!(count);
        }
    }
    value
}

/// Unwrap the Qase `{status, result}` wrapper according to the result shape.
fn normalize(shape: ResultShape, status: u16, body: Value) -> GatewayResult<Value> {
    let result = match body {
        Value::Object(mut map) => match map.remove("result") {
            Some(result) => Some(result),
            None if shape == ResultShape::Ack => Some(Value::Object(map)),
            None => None,
        },
        Value::Null => None,
        other => Some(other),
    };

    match (shape, result) {
        (_, Some(result)) if !result.is_null() => Ok(result),
        (ResultShape::Ack, _) => Ok(json!({ "status": true })),
        _ => Err(GatewayError::unexpected_response(
            status,
            "response has no `result`",
        )),
    }
}
