//! Statistics tracking for the resolver.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for resolution outcomes.
pub struct Stats {
    pub queries: AtomicU64,
    pub cache_hits: AtomicU64,
    pub json_api: AtomicU64,
    pub wire_format: AtomicU64,
    pub system: AtomicU64,
    pub failures: AtomicU64,
    /// Cumulative resolution time in microseconds for averaging.
    total_resolve_time_us: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            json_api: AtomicU64::new(0),
            wire_format: AtomicU64::new(0),
            system: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_resolve_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_cache_hit(&self, elapsed_us: u64) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.total_resolve_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
    }

    /// Record a successful resolution attributed to the named strategy.
    pub fn record_resolved(&self, strategy: &str, elapsed_us: u64) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        match strategy {
            "json-api" => self.json_api.fetch_add(1, Ordering::Relaxed),
            "wire-format" => self.wire_format.fetch_add(1, Ordering::Relaxed),
            _ => self.system.fetch_add(1, Ordering::Relaxed),
        };
        self.total_resolve_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn record_failure(&self, elapsed_us: u64) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.total_resolve_time_us
            .fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let queries = self.queries.swap(0, Ordering::Relaxed);
        let cache_hits = self.cache_hits.swap(0, Ordering::Relaxed);
        let json_api = self.json_api.swap(0, Ordering::Relaxed);
        let wire_format = self.wire_format.swap(0, Ordering::Relaxed);
        let system = self.system.swap(0, Ordering::Relaxed);
        let failures = self.failures.swap(0, Ordering::Relaxed);
        let total_us = self.total_resolve_time_us.swap(0, Ordering::Relaxed);

        let avg_resolve_ms = if queries > 0 {
            (total_us as f64 / queries as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            queries,
            cache_hits,
            json_api,
            wire_format,
            system,
            failures,
            avg_resolve_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub queries: u64,
    pub cache_hits: u64,
    pub json_api: u64,
    pub wire_format: u64,
    pub system: u64,
    pub failures: u64,
    pub avg_resolve_ms: f64,
}
