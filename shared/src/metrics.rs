use crate::counter;
use crate::metrics_defs::{MetricDef, MetricType};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of resolution cache hits. Tagged with category.",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of resolution cache misses. Tagged with category.",
};

pub const HTTP_REQUESTS: MetricDef = MetricDef {
    name: "http.requests",
    metric_type: MetricType::Counter,
    description: "Number of HTTP requests received",
};

pub const ALL_METRICS: &[MetricDef] = &[CACHE_HIT, CACHE_MISS, HTTP_REQUESTS];

/// The two independent cache stores that hit/miss counts are kept for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Membership,
    Role,
}

impl CacheCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Membership => "membership",
            CacheCategory::Role => "role",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub membership_hits: u64,
    pub membership_misses: u64,
    pub role_hits: u64,
    pub role_misses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub cache: CacheStats,
    pub uptime: Duration,
    pub total_requests: u64,
}

struct MetricsInner {
    started_at: Instant,
    membership_hits: AtomicU64,
    membership_misses: AtomicU64,
    role_hits: AtomicU64,
    role_misses: AtomicU64,
    total_requests: AtomicU64,
}

/// Process-lifetime counters for cache effectiveness and request volume.
///
/// Counters only ever increase; clearing the cache does not reset them. Each
/// increment is also forwarded to the `metrics` facade so an installed
/// exporter can ship it.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(MetricsInner {
                started_at: Instant::now(),
                membership_hits: AtomicU64::new(0),
                membership_misses: AtomicU64::new(0),
                role_hits: AtomicU64::new(0),
                role_misses: AtomicU64::new(0),
                total_requests: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache_hit(&self, category: CacheCategory) {
        let counter = match category {
            CacheCategory::Membership => &self.inner.membership_hits,
            CacheCategory::Role => &self.inner.role_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counter!(CACHE_HIT, "category" => category.as_str()).increment(1);
    }

    pub fn cache_miss(&self, category: CacheCategory) {
        let counter = match category {
            CacheCategory::Membership => &self.inner.membership_misses,
            CacheCategory::Role => &self.inner.role_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        counter!(CACHE_MISS, "category" => category.as_str()).increment(1);
    }

    pub fn request(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        counter!(HTTP_REQUESTS).increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache: CacheStats {
                membership_hits: self.inner.membership_hits.load(Ordering::Relaxed),
                membership_misses: self.inner.membership_misses.load(Ordering::Relaxed),
                role_hits: self.inner.role_hits.load(Ordering::Relaxed),
                role_misses: self.inner.role_misses.load(Ordering::Relaxed),
            },
            uptime: self.inner.started_at.elapsed(),
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_counts() {
        let metrics = Metrics::new();
        let shared = metrics.clone();

        metrics.cache_hit(CacheCategory::Membership);
        metrics.cache_hit(CacheCategory::Membership);
        shared.cache_miss(CacheCategory::Membership);
        shared.cache_miss(CacheCategory::Role);
        metrics.cache_hit(CacheCategory::Role);
        metrics.request();

        tokio::time::advance(Duration::from_secs(42)).await;

        let snapshot = metrics.snapshot();
        assert_eq!(
            snapshot.cache,
            CacheStats {
                membership_hits: 2,
                membership_misses: 1,
                role_hits: 1,
                role_misses: 1,
            }
        );
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.uptime.as_secs(), 42);
    }

    #[test]
    fn test_cache_stats_serialize_camel_case() {
        let stats = CacheStats {
            membership_hits: 3,
            membership_misses: 1,
            role_hits: 0,
            role_misses: 2,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "membershipHits": 3,
                "membershipMisses": 1,
                "roleHits": 0,
                "roleMisses": 2,
            })
        );
    }
}
