//! Retry policy with exponential backoff.
//!
//! The transport retries three kinds of failure, each with its own budget:
//!
//! - **429**: wait for `Retry-After` and repeat once
//! - **5xx**: repeat once, idempotent requests only
//! - **network**: up to two more attempts with exponential backoff and
//!   jitter; idempotent requests, or any request that never left the client
//!
//! 4xx responses other than 429 are never retried.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after a 429.
    pub rate_limit_retries: u32,

    /// Extra attempts after a 5xx.
    pub server_retries: u32,

    /// Extra attempts after a network failure.
    pub network_retries: u32,

    /// Delay before the first backoff retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff multiplier (typically 2.0).
    pub exponential_base: f64,

    /// Upper bound on a single backoff delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Maximum random jitter added to each backoff delay, in milliseconds.
    pub jitter_ms: u64,

    /// Wait after a 429 without a usable `Retry-After` header, in seconds.
    pub default_retry_after_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_retries: 1,
            server_retries: 1,
            network_retries: 2,
            base_delay_ms: 500,
            exponential_base: 2.0,
            max_delay_ms: 10_000,
            jitter_ms: 250,
            default_retry_after_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Short, jitter-free delays for tests against local servers.
    pub fn fast() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 100,
            jitter_ms: 0,
            ..Self::default()
        }
    }

    /// Never retry anything.
    pub fn no_retry() -> Self {
        Self {
            rate_limit_retries: 0,
            server_retries: 0,
            network_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before the given retry (1-based), jitter included.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay_ms = (self.base_delay_ms as f64 * self.exponential_base.powi(exponent))
            .min(self.max_delay_ms as f64);
        let jitter_ms = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(delay_ms as u64 + jitter_ms)
    }

    /// Wait requested by a 429 response.
    ///
    /// Accepts whole seconds; anything else falls back to the default.
    pub fn retry_after(&self, header: Option<&str>) -> Duration {
        header
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(self.default_retry_after_secs))
    }

    /// Decide whether to retry after a failure, consuming budget if so.
    pub(crate) fn decide(
        &self,
        budget: &mut RetryBudget,
        failure: Failure,
        idempotent: bool,
    ) -> Option<Duration> {
        match failure {
            Failure::RateLimited { retry_after } => {
                if budget.rate_limited < self.rate_limit_retries {
                    budget.rate_limited += 1;
                    Some(retry_after)
                } else {
                    None
                }
            }
            Failure::Server => {
                if idempotent && budget.server < self.server_retries {
                    budget.server += 1;
                    Some(self.backoff(budget.server))
                } else {
                    None
                }
            }
            Failure::Network { pre_send } => {
                if (idempotent || pre_send) && budget.network < self.network_retries {
                    budget.network += 1;
                    Some(self.backoff(budget.network))
                } else {
                    None
                }
            }
        }
    }
}

/// Retryable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Failure {
    /// 429 with the wait the backend asked for.
    RateLimited { retry_after: Duration },
    /// 5xx.
    Server,
    /// Connection-level failure; `pre_send` when the request never left.
    Network { pre_send: bool },
}

/// Retries consumed so far by one send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RetryBudget {
    rate_limited: u32,
    server: u32,
    network: u32,
}

impl RetryBudget {
    /// Total retries consumed.
    pub(crate) fn total(&self) -> u32 {
        self.rate_limited + self.server + self.network
    }
}
