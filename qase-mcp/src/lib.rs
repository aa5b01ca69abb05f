//! # Qase MCP
//!
//! This crate exposes the Qase test-management REST API as MCP (Model Context
//! Protocol) tools. The MCP host delivers a tool name and arguments; the
//! gateway turns them into authenticated, rate-limited HTTP calls and hands
//! back a normalized result.
//!
//! ## Overview
//!
//! The qase-mcp crate handles:
//! - **Registry**: every Qase tool with its method, path and argument schema
//! - **Requests**: placeholder substitution, `filters[...]` query encoding, JSON and multipart bodies
//! - **Transport**: token-bucket admission, 429 `Retry-After` handling, retry with backoff
//! - **Pagination**: `limit`/`offset` walks gathered into one entity list
//! - **Bulk**: chunked, concurrent bulk creation with per-item outcomes
//! - **Cache**: short-lived cache for projects, custom fields and system fields
//! - **Health**: liveness/readiness checks and request metrics
//!
//! JSON-RPC framing, the `initialize` handshake and stdio/HTTP transports are
//! left to the MCP host.
//!
//! ## Configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `QASE_API_TOKEN` | required |
//! | `QASE_API_URL` | `https://api.qase.io/v1` |
//! | `QASE_API_V2_URL` | `https://api.qase.io/v2` |
//! | `QASE_TIMEOUT_SECS` | 30 |
//! | `QASE_RATE_LIMIT_PER_MINUTE` | 600 |
//! | `QASE_RATE_LIMIT_BURST` | 10 |
//! | `QASE_CACHE_TTL_SECS` | 300 |
//! | `QASE_BULK_CHUNK_SIZE` | 100 |
//! | `QASE_PAGE_SIZE` | 100 |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use qase_mcp::{GatewayConfig, ToolGateway, ToolInvocation};
//! use serde_json::json;
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = ToolGateway::new(GatewayConfig::from_env()?)?;
//!     println!("{} tools", gateway.catalog().len());
//!
//!     let envelope = gateway
//!         .invoke_envelope(ToolInvocation::new(
//!             "qase_create_test_case",
//!             json!({"project_code": "DEMO", "title": "Login works"}),
//!         ))
//!         .await;
//!     println!("{}", envelope.to_value());
//!     Ok(())
//! }
//! ```
//!
//! ## Tool Categories
//!
//! Tools are named `qase_<verb>_<resource>` and grouped by the first path
//! segment of their endpoint:
//! - `project`, `case`, `suite`, `shared_step`, `shared_parameter`
//! - `custom_field`, `system_field`
//! - `plan`, `run`, `result`
//! - `defect`, `environment`, `milestone`, `author`, `user`, `search`, `attachment`

pub mod bulk;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod pagination;
pub mod registry;
pub mod request;
pub mod transport;
pub mod types;

// Re-export main types
pub use config::{ApiEndpoints, ApiToken, ConfigError, GatewayConfig, RateLimitConfig};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use gateway::{ErrorBody, FailedItem, ToolEnvelope, ToolGateway, ToolInvocation, ToolOutput};
pub use types::{ContentBlock, ToolCall, ToolDefinition, ToolResult};

// Re-export building blocks
pub use bulk::{BulkBatcher, BulkReport, ItemOutcome, ItemStatus};
pub use cache::{CacheKey, ReferenceCache};
pub use pagination::{Collected, Paginator};
pub use registry::{ApiVersion, EndpointRegistry, HttpMethod, ToolDescriptor, ToolMode};
pub use request::{ApiRequest, RequestBody, RequestBuilder};
pub use transport::{ApiResponse, HttpSender, ReqwestSender, RetryPolicy, SendError, TokenBucket, Transport};

// Re-export health check types
pub use health::{
    GatewayMetrics, HealthChecker, HealthReport, HealthStatus, LivenessResult, MetricsCollector,
    ReadinessResult, ServiceHealth,
};
