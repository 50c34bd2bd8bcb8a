//! Cache entry bookkeeping for expiry and refresh

use crate::cache::config::CacheConfig;
use std::time::{Duration, Instant};

/// A cached value with the timestamps its expiry policy needs
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value
    pub value: V,

    /// Entry metadata
    pub metadata: CacheMetadata,
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    /// Monotonic write time, drives expire-after-write and refresh-after-write
    pub written_at: Instant,

    /// Monotonic last read time, drives expire-after-access
    pub accessed_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create a new entry written at the given instant
    pub fn written_at(value: V, now: Instant) -> Self {
        Self {
            value,
            metadata: CacheMetadata {
                written_at: now,
                accessed_at: now,
            },
        }
    }

    /// Check if the entry has expired under the given configuration
    pub fn is_expired(&self, config: &CacheConfig, now: Instant) -> bool {
        if let Some(ttl) = config.expire_after_write {
            if self.age(now) >= ttl {
                return true;
            }
        }
        if let Some(ttl) = config.expire_after_access {
            if self.idle(now) >= ttl {
                return true;
            }
        }
        false
    }

    /// Check if a loading cache should reload this entry in the background
    pub fn needs_refresh(&self, config: &CacheConfig, now: Instant) -> bool {
        config
            .refresh_after_write
            .map(|interval| self.age(now) >= interval)
            .unwrap_or(false)
    }

    /// Mark the entry as read, restarting its expire-after-access clock
    pub fn mark_accessed(&mut self, now: Instant) {
        self.metadata.accessed_at = now;
    }

    /// Time since the entry was written
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.metadata.written_at)
    }

    /// Time since the entry was last read
    pub fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.metadata.accessed_at)
    }
}
