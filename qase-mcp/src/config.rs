//! Gateway configuration.
//!
//! Provides centralized configuration for the Qase API endpoints, the API
//! token, rate-limit budget, cache TTL and batching limits. Configuration is
//! loaded from environment variables with defaults matching the public Qase
//! cloud.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default base URL of the v1 API.
pub const DEFAULT_V1_URL: &str = "https://api.qase.io/v1";

/// Default base URL of the v2 API.
pub const DEFAULT_V2_URL: &str = "https://api.qase.io/v2";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Qase API token.
///
/// Never printed: both `Debug` and `Display` render a placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value, for the `Token` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Base URLs for each API version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// v1 base URL (e.g., "https://api.qase.io/v1").
    pub v1: String,

    /// v2 base URL (e.g., "https://api.qase.io/v2").
    pub v2: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            v1: DEFAULT_V1_URL.to_string(),
            v2: DEFAULT_V2_URL.to_string(),
        }
    }
}

/// Outbound request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per minute (Qase cloud allows 600).
    pub per_minute: u32,

    /// Maximum number of requests that may be sent back-to-back.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 600,
            burst: 10,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// API token sent in the `Token` header.
    #[serde(skip, default = "empty_token")]
    pub api_token: ApiToken,

    /// Base URLs per API version.
    pub endpoints: ApiEndpoints,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Outbound rate-limit budget.
    pub rate_limit: RateLimitConfig,

    /// Default TTL for reference-data cache entries, in seconds.
    pub cache_ttl_secs: u64,

    /// Upper bound on the number of items sent in one bulk request.
    pub bulk_chunk_ceiling: usize,

    /// Page size used by the pagination aggregator.
    pub page_size: u64,

    /// Retry and backoff settings.
    #[serde(default)]
    pub retry: crate::transport::RetryPolicy,
}

fn empty_token() -> ApiToken {
    ApiToken::new("")
}

impl Default for GatewayConfig {
    /// Defaults for the public Qase cloud; the token still has to be supplied.
    fn default() -> Self {
        Self {
            api_token: empty_token(),
            endpoints: ApiEndpoints::default(),
            timeout_secs: 30,
            rate_limit: RateLimitConfig::default(),
            cache_ttl_secs: 300,
            bulk_chunk_ceiling: 100,
            page_size: 100,
            retry: crate::transport::RetryPolicy::default(),
        }
    }
}

impl GatewayConfig {
    /// Default configuration with the given token.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: ApiToken::new(api_token),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `QASE_API_TOKEN`: API token (required)
    /// - `QASE_API_URL`: v1 base URL (default: https://api.qase.io/v1)
    /// - `QASE_API_V2_URL`: v2 base URL (default: https://api.qase.io/v2)
    /// - `QASE_TIMEOUT_SECS`: Request timeout in seconds (default: 30)
    /// - `QASE_RATE_LIMIT_PER_MINUTE`: Request budget per minute (default: 600)
    /// - `QASE_RATE_LIMIT_BURST`: Back-to-back request allowance (default: 10)
    /// - `QASE_CACHE_TTL_SECS`: Reference-data cache TTL (default: 300)
    /// - `QASE_BULK_CHUNK_SIZE`: Maximum items per bulk request (default: 100)
    /// - `QASE_PAGE_SIZE`: Page size for list tools (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let api_token = lookup("QASE_API_TOKEN")
            .map(ApiToken::new)
            .filter(|token| !token.is_blank())
            .ok_or_else(|| ConfigError::MissingEnvVar("QASE_API_TOKEN".to_string()))?;

        let config = Self {
            api_token,
            endpoints: ApiEndpoints {
                v1: lookup("QASE_API_URL").unwrap_or(default.endpoints.v1),
                v2: lookup("QASE_API_V2_URL").unwrap_or(default.endpoints.v2),
            },
            timeout_secs: parse_var(&lookup, "QASE_TIMEOUT_SECS", default.timeout_secs)?,
            rate_limit: RateLimitConfig {
                per_minute: parse_var(
                    &lookup,
                    "QASE_RATE_LIMIT_PER_MINUTE",
                    default.rate_limit.per_minute,
                )?,
                burst: parse_var(&lookup, "QASE_RATE_LIMIT_BURST", default.rate_limit.burst)?,
            },
            cache_ttl_secs: parse_var(&lookup, "QASE_CACHE_TTL_SECS", default.cache_ttl_secs)?,
            bulk_chunk_ceiling: parse_var(
                &lookup,
                "QASE_BULK_CHUNK_SIZE",
                default.bulk_chunk_ceiling,
            )?,
            page_size: parse_var(&lookup, "QASE_PAGE_SIZE", default.page_size)?,
            retry: default.retry,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_token.is_blank() {
            return Err(ConfigError::MissingEnvVar("QASE_API_TOKEN".to_string()));
        }
        if self.rate_limit.per_minute == 0 {
            return Err(invalid("QASE_RATE_LIMIT_PER_MINUTE", "must be greater than zero"));
        }
        if self.bulk_chunk_ceiling == 0 {
            return Err(invalid("QASE_BULK_CHUNK_SIZE", "must be greater than zero"));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(invalid("QASE_PAGE_SIZE", "must be between 1 and 100"));
        }
        for (key, url) in [("QASE_API_URL", &self.endpoints.v1), ("QASE_API_V2_URL", &self.endpoints.v2)] {
            if reqwest::Url::parse(url).is_err() {
                return Err(invalid(key, "must be an absolute URL"));
            }
        }
        Ok(())
    }

    /// Request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(key, &format!("`{}` is not a valid number", raw))),
    }
}
