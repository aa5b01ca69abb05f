//! Reference-data cache.
//!
//! In-memory TTL cache for slow-changing reference data (projects, custom
//! fields, system fields). Expired entries are evicted lazily on read.
//! Concurrent misses for the same key may each fetch; the last writer wins.
//! A fetch that overlaps an invalidation is returned but not stored.

use crate::error::GatewayResult;
use crate::health::MetricsCollector;
use crate::registry::ApiVersion;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Identity of a cached reference document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// API the data came from.
    pub api_version: ApiVersion,
    /// Reference endpoint name (e.g. "custom_field").
    pub endpoint: &'static str,
    /// Project the data belongs to, when project-scoped.
    pub project_code: Option<String>,
    /// Remaining distinguishing arguments (e.g. an entity id), rendered.
    pub variant: String,
}

impl CacheKey {
    /// Key for a whole endpoint within a project.
    pub fn new(api_version: ApiVersion, endpoint: &'static str, project_code: Option<String>) -> Self {
        Self {
            api_version,
            endpoint,
            project_code,
            variant: String::new(),
        }
    }

    /// Narrow the key to one variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Stored entries, including expired ones not yet evicted.
    pub entries: usize,
    /// Stored entries that are still fresh.
    pub fresh: usize,
}

/// TTL cache shared by every invocation of one gateway.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    /// Bumped under the write lock by every invalidation.
    generation: Arc<AtomicU64>,
    metrics: Arc<MetricsCollector>,
}

impl ReferenceCache {
    /// Create an empty cache.
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    /// Fresh value for `key`, if any. Removes the entry when it has expired.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).map_or(false, |entry| entry.expires_at <= now) {
            entries.remove(key);
            debug!(endpoint = key.endpoint, "Evicted expired cache entry");
        }
        None
    }

    /// Store a value for `ttl`.
    pub async fn insert(&self, key: CacheKey, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Store a fetched value unless an invalidation ran since `generation`
    /// was read.
    async fn insert_if_current(&self, key: CacheKey, value: Value, ttl: Duration, generation: u64) {
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(endpoint = key.endpoint, project = ?key.project_code, "Discarded fetch overlapping an invalidation");
            return;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Cached value for `key`, or the result of `fetch`, stored for `ttl`.
    ///
    /// Fetch errors are returned and not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, ttl: Duration, fetch: F) -> GatewayResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<Value>>,
    {
        if let Some(value) = self.get(&key).await {
            self.metrics.record_cache(true);
            debug!(endpoint = key.endpoint, project = ?key.project_code, "Cache hit");
            return Ok(value);
        }

        self.metrics.record_cache(false);
        debug!(endpoint = key.endpoint, project = ?key.project_code, "Cache miss");
        let generation = self.generation.load(Ordering::SeqCst);
        let value = fetch().await?;
        self.insert_if_current(key, value.clone(), ttl, generation).await;
        Ok(value)
    }

    /// Drop one entry.
    pub async fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.remove(key);
    }

    /// Drop every entry of an endpoint, optionally only within one project.
    ///
    /// Returns how many entries were removed.
    pub async fn invalidate_endpoint(&self, endpoint: &str, project_code: Option<&str>) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = entries.len();
        entries.retain(|key, _| {
            let project_matches = match project_code {
                Some(code) => key.project_code.as_deref() == Some(code),
                None => true,
            };
            !(key.endpoint == endpoint && project_matches)
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(endpoint, project = ?project_code, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Drop everything.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    /// Entry counts.
    pub async fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            fresh: entries.values().filter(|e| e.expires_at > now).count(),
        }
    }
}
