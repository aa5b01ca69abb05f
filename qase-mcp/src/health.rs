//! Health checks and request metrics for the gateway.
//!
//! - **Liveness**: is the gateway running?
//! - **Readiness**: does a cheap authenticated call to Qase succeed?
//! - **Report**: readiness plus latency classification and a metrics snapshot.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use qase_mcp::{GatewayConfig, ToolGateway};
//!
//! async fn check_health() {
//!     let gateway = ToolGateway::new(GatewayConfig::from_env().unwrap()).unwrap();
//!     let report = gateway.health_checker().check_all().await;
//!     println!("Status: {:?} ({})", report.status, report.message);
//! }
//! ```

use crate::registry::ApiVersion;
use crate::request::ApiRequest;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Latencies kept for percentile calculation.
const LATENCY_WINDOW: usize = 10_000;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The Qase API answers promptly.
    Healthy,
    /// The Qase API answers, but slowly.
    Degraded,
    /// The Qase API cannot be used.
    Unhealthy,
}

/// Result of probing one Qase API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Probe name.
    pub name: String,

    /// Probe status.
    pub status: HealthStatus,

    /// Probe latency in milliseconds.
    pub latency_ms: u64,

    /// Probed URL.
    pub url: String,

    /// Error message if the probe failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,

    /// Timestamp of the check (ISO 8601).
    pub timestamp: String,

    /// Probe results.
    pub services: Vec<ServiceHealth>,

    /// Total check duration in milliseconds.
    pub check_duration_ms: u64,

    /// Gateway version.
    pub gateway_version: String,

    /// Request metrics at the time of the check.
    pub metrics: GatewayMetrics,

    /// Summary message.
    pub message: String,
}

/// Liveness check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResult {
    /// Is the gateway alive?
    pub alive: bool,

    /// Timestamp.
    pub timestamp: String,

    /// Uptime in seconds.
    pub uptime_secs: u64,
}

/// Readiness check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResult {
    /// Is the gateway ready?
    pub ready: bool,

    /// Timestamp.
    pub timestamp: String,

    /// Reason if not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Latency threshold for degraded status (ms).
    pub degraded_threshold_ms: u64,

    /// Include backend error messages in reports.
    pub include_details: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            degraded_threshold_ms: 1000,
            include_details: true,
        }
    }
}

/// Probes the Qase API through the gateway's own transport, so probes
/// share the rate-limit budget with tool calls.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    transport: Transport,
    probe: ApiRequest,
    config: HealthCheckConfig,
    start_time: Instant,
}

impl HealthChecker {
    /// Create a checker that sends `probe` to test readiness.
    pub fn new(transport: Transport, probe: ApiRequest, config: HealthCheckConfig) -> Self {
        Self {
            transport,
            probe,
            config,
            start_time: Instant::now(),
        }
    }

    /// Time since the checker was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Quick liveness check. Never touches the network.
    pub async fn check_liveness(&self) -> LivenessResult {
        LivenessResult {
            alive: true,
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Readiness check: the probe request must succeed.
    #[instrument(skip(self))]
    pub async fn check_readiness(&self) -> ReadinessResult {
        debug!("Performing readiness check");
        let probe = self.probe_api().await;
        ReadinessResult {
            ready: probe.status != HealthStatus::Unhealthy,
            timestamp: chrono::Utc::now().to_rfc3339(),
            reason: probe.error,
        }
    }

    /// Full health report.
    #[instrument(skip(self))]
    pub async fn check_all(&self) -> HealthReport {
        info!("Performing full health check");
        let start = Instant::now();

        let services = vec![self.probe_api().await];
        let status = Self::aggregate_status(&services);
        let duration = start.elapsed();

        let message = match status {
            HealthStatus::Healthy => "Qase API operational".to_string(),
            HealthStatus::Degraded => "Qase API responding slowly".to_string(),
            HealthStatus::Unhealthy => "Qase API unavailable".to_string(),
        };

        info!(status = ?status, duration_ms = duration.as_millis() as u64, "Health check complete");

        HealthReport {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
            check_duration_ms: duration.as_millis() as u64,
            gateway_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: self.transport.metrics().snapshot(),
            message,
        }
    }

    async fn probe_api(&self) -> ServiceHealth {
        let start = Instant::now();
        let outcome = self.transport.send(&self.probe).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let name = format!("qase-api-{}", self.probe.api_version.as_str());

        match outcome {
            Ok(_) => {
                let status = if latency_ms > self.config.degraded_threshold_ms {
                    warn!(latency_ms, "Qase API response time exceeds threshold");
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                ServiceHealth {
                    name,
                    status,
                    latency_ms,
                    url: self.probe.url.clone(),
                    error: None,
                }
            }
            Err(err) => {
                warn!(error = %err, "Qase API probe failed");
                ServiceHealth {
                    name,
                    status: HealthStatus::Unhealthy,
                    latency_ms,
                    url: self.probe.url.clone(),
                    error: Some(if self.config.include_details {
                        err.to_string()
                    } else {
                        err.kind().to_string()
                    }),
                }
            }
        }
    }

    fn aggregate_status(services: &[ServiceHealth]) -> HealthStatus {
        if services.iter().any(|s| s.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if services.iter().any(|s| s.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Snapshot of gateway request metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetrics {
    /// Attempts sent to the v1 API.
    pub v1_requests: u64,

    /// Attempts sent to the v2 API.
    pub v2_requests: u64,

    /// Attempts that failed (429, other 4xx, 5xx or no response).
    pub failed_requests: u64,

    /// 429 responses received.
    pub rate_limited_responses: u64,

    /// Retries performed.
    pub retries: u64,

    /// Reference-cache hits.
    pub cache_hits: u64,

    /// Reference-cache misses.
    pub cache_misses: u64,

    /// Average latency in milliseconds.
    pub avg_latency_ms: f64,

    /// 95th percentile latency in milliseconds.
    pub p95_latency_ms: f64,

    /// 99th percentile latency in milliseconds.
    pub p99_latency_ms: f64,

    /// Success rate (0.0 - 1.0).
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    v1: u64,
    v2: u64,
    failed: u64,
    rate_limited: u64,
    retries: u64,
    cache_hits: u64,
    cache_misses: u64,
}

/// Collects request metrics; shared by the transport and the cache.
#[derive(Debug)]
pub struct MetricsCollector {
    latencies: Mutex<VecDeque<u64>>,
    counters: Mutex<Counters>,
}

/// Lock ignoring poisoning; counters stay usable after a panicking writer.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            latencies: Mutex::new(VecDeque::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Record one attempt that produced a classified outcome.
    pub fn record_request(&self, version: ApiVersion, latency_ms: u64, success: bool) {
        {
            let mut latencies = lock(&self.latencies);
            latencies.push_back(latency_ms);
            if latencies.len() > LATENCY_WINDOW {
                latencies.pop_front();
            }
        }

        let mut counters = lock(&self.counters);
        match version {
            ApiVersion::V1 => counters.v1 += 1,
            ApiVersion::V2 => counters.v2 += 1,
        }
        if !success {
            counters.failed += 1;
        }
    }

    /// Record a 429 response.
    pub fn record_rate_limited(&self) {
        lock(&self.counters).rate_limited += 1;
    }

    /// Record a retry.
    pub fn record_retry(&self) {
        lock(&self.counters).retries += 1;
    }

    /// Record a cache lookup.
    pub fn record_cache(&self, hit: bool) {
        let mut counters = lock(&self.counters);
        if hit {
            counters.cache_hits += 1;
        } else {
            counters.cache_misses += 1;
        }
    }

    /// Current metrics.
    pub fn snapshot(&self) -> GatewayMetrics {
        let mut sorted: Vec<u64> = lock(&self.latencies).iter().copied().collect();
        let counters = lock(&self.counters);

        let (avg, p95, p99) = if sorted.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            sorted.sort_unstable();
            let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
            let percentile = |p: f64| {
                let idx = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
                sorted[idx] as f64
            };
            (avg, percentile(0.95), percentile(0.99))
        };

        let total = counters.v1 + counters.v2;
        let success_rate = if total > 0 {
            (total - counters.failed) as f64 / total as f64
        } else {
            1.0
        };

        GatewayMetrics {
            v1_requests: counters.v1,
            v2_requests: counters.v2,
            failed_requests: counters.failed,
            rate_limited_responses: counters.rate_limited,
            retries: counters.retries,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            avg_latency_ms: avg,
            p95_latency_ms: p95,
            p99_latency_ms: p99,
            success_rate,
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        lock(&self.latencies).clear();
        *lock(&self.counters) = Counters::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
