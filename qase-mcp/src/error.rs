//! Gateway error taxonomy.
//!
//! Every failure that can leave [`crate::ToolGateway::invoke`] is one of the
//! variants below. Transport, decoding and build failures are converted into
//! this taxonomy at the gateway boundary so that no raw `reqwest` or
//! `serde_json` error ever reaches a tool result.

use crate::bulk::BulkReport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Machine-readable error kind, serialized in `snake_case`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments failed schema checks; nothing was sent.
    ValidationError,
    /// The tool name is not in the registry.
    NotFoundTool,
    /// The backend kept answering 429 after the automatic retry.
    RateLimited,
    /// Backend 4xx other than 429.
    UpstreamClientError,
    /// Backend 5xx (or an unusable 2xx body) after retries.
    UpstreamServerError,
    /// Connection-level failure after retries.
    NetworkFailure,
    /// At least one bulk chunk failed.
    PartialBulkFailure,
}

impl ErrorKind {
    /// Stable string form, identical to the serialized value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::NotFoundTool => "not_found_tool",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamClientError => "upstream_client_error",
            ErrorKind::UpstreamServerError => "upstream_server_error",
            ErrorKind::NetworkFailure => "network_failure",
            ErrorKind::PartialBulkFailure => "partial_bulk_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the tool gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Invocation arguments failed validation.
    #[error("Invalid argument `{field}`: {message}")]
    Validation {
        /// Offending argument (or path placeholder) name.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// Unknown tool name.
    #[error("Tool not found: {0}")]
    NotFoundTool(String),

    /// Backend rate limit still in effect after the automatic retry.
    #[error("Rate limited by Qase API, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Wait duration requested by the backend.
        retry_after: Duration,
    },

    /// Backend rejected the request (4xx other than 429).
    #[error("Qase API error ({status}): {message}")]
    UpstreamClient {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the backend response.
        message: String,
    },

    /// Backend failed (5xx) or answered with an unusable body.
    #[error("Qase API server error ({status}): {message}")]
    UpstreamServer {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the backend response.
        message: String,
    },

    /// Transport-level failure.
    #[error("Network failure: {message}")]
    NetworkFailure {
        /// Description of the failure.
        message: String,
    },

    /// A bulk operation where at least one chunk failed.
    #[error("Bulk operation partially failed: {} of {} items failed", report.failed, report.items.len())]
    PartialBulkFailure {
        /// Per-item outcomes, aligned with the input order.
        report: BulkReport,
    },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Build a validation error for a field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        GatewayError::NetworkFailure {
            message: message.into(),
        }
    }

    /// Build an error for a 2xx response whose body does not have the expected shape.
    pub fn unexpected_response(status: u16, message: impl Into<String>) -> Self {
        GatewayError::UpstreamServer {
            status,
            message: format!("Unexpected response: {}", message.into()),
        }
    }

    /// Machine-readable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation { .. } => ErrorKind::ValidationError,
            GatewayError::NotFoundTool(_) => ErrorKind::NotFoundTool,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::UpstreamClient { .. } => ErrorKind::UpstreamClientError,
            GatewayError::UpstreamServer { .. } => ErrorKind::UpstreamServerError,
            GatewayError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            GatewayError::PartialBulkFailure { .. } => ErrorKind::PartialBulkFailure,
        }
    }

    /// Whether the error is deterministic (retrying the same call cannot help).
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            GatewayError::Validation { .. }
                | GatewayError::NotFoundTool(_)
                | GatewayError::UpstreamClient { .. }
        )
    }
}
