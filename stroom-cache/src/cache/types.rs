//! Statistics and introspection types for named caches

use crate::cache::config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique name of a cache within a [`CacheManager`](crate::cache::CacheManager)
pub type CacheName = String;

/// Snapshot of cache performance counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,

    /// Lookups that found nothing (or only an expired entry)
    pub misses: u64,

    /// Successful loader invocations
    pub loads: u64,

    /// Failed loader invocations
    pub load_failures: u64,

    /// Entries evicted because the cache exceeded its maximum size
    pub evictions_size: u64,

    /// Entries removed because they expired
    pub expirations: u64,

    /// Entries removed by invalidate, remove or clear
    pub invalidations: u64,
}

impl CacheStats {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Total entries removed by the eviction policy
    pub fn total_evictions(&self) -> u64 {
        self.evictions_size + self.expirations
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, loads: {}, load_failures: {}, evictions: {}, invalidations: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.loads,
            self.load_failures,
            self.total_evictions(),
            self.invalidations
        )
    }
}

/// One row of the admin cache listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub name: CacheName,

    /// Node the row was read on, when the registry knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Live entry count (approximate under concurrent mutation)
    pub size: usize,

    /// Maximum size as currently supplied, read at listing time
    pub maximum_size: Option<u64>,

    /// Configuration currently in force
    pub config: CacheConfig,

    /// Whether the cache computes missing values itself
    pub loading: bool,

    pub hit_rate: f64,

    pub stats: CacheStats,
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions_size: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self, success: bool) {
        if success {
            self.loads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_size_evictions(&self, count: u64) {
        self.evictions_size.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions_size: self.evictions_size.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}
