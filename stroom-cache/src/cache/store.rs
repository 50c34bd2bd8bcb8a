//! Named cache store with LRU eviction, expiry and removal notification

use crate::cache::{
    config::{CacheConfig, ConfigSupplier},
    entry::CacheEntry,
    invalidation::{run_guarded, RemovalCause, RemovalListener, RemovalNotification},
    types::{CacheInfo, CacheStats, StatsCounters},
};
use crate::error::{CacheError, Result};
use lru::LruCache;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Entries that left the store, waiting to be reported once the lock is released
pub(crate) type Removed<K, V> = Vec<(K, V, RemovalCause)>;

type Entries<K, V> = LruCache<K, CacheEntry<V>>;

/// Bounded, optionally time-expiring key-value store
///
/// This implementation provides:
/// - Thread-safe access; each cache has its own lock, never shared
/// - Least recently used eviction above `maximum_size`
/// - Lazy expiry on access plus an explicit sweep ([`NamedCache::evict_expired`])
/// - One removal notification per entry that leaves the cache
///
/// Handles are cheap to clone and all clones share the same storage.
/// Removal listeners run on the caller's thread after the store lock has been
/// released, so a listener may safely call back into the cache.
pub struct NamedCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V> {
    name: String,
    supplier: ConfigSupplier,
    /// Configuration in force; replaced by `rebuild`
    config: RwLock<CacheConfig>,
    entries: Mutex<Entries<K, V>>,
    listener: Option<RemovalListener<K, V>>,
    stats: StatsCounters,
    /// Set when the owning manager closes; writes are ignored from then on
    closed: AtomicBool,
}

/// Result of a lookup, as seen by the loading layer
pub(crate) enum Lookup<V> {
    Hit { value: V, refresh_due: bool },
    Miss,
}

impl<K, V> Clone for NamedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> NamedCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache, reading and validating its configuration once up front
    pub fn new(
        name: impl Into<String>,
        supplier: ConfigSupplier,
        listener: Option<RemovalListener<K, V>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CacheError::InvalidName(name));
        }

        let config = supplier();
        config
            .validate()
            .map_err(|message| CacheError::ConfigurationError {
                cache: name.clone(),
                message,
            })?;

        info!("Creating cache '{}' with config: {:?}", name, config);

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                supplier,
                config: RwLock::new(config),
                entries: Mutex::new(LruCache::unbounded()),
                listener,
                stats: StatsCounters::default(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration currently in force
    pub fn config(&self) -> CacheConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Configuration the supplier returns right now
    pub fn supplied_config(&self) -> CacheConfig {
        (self.inner.supplier)()
    }

    /// Get a live value; expired entries are removed and reported as misses
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.lookup(key) {
            Lookup::Hit { value, .. } => Some(value),
            Lookup::Miss => None,
        }
    }

    pub(crate) fn lookup<Q>(&self, key: &Q) -> Lookup<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let config = self.config();
        let now = Instant::now();
        let mut removed = Vec::new();

        let result = {
            let mut entries = self.lock_entries();
            match entries.peek(key).map(|entry| entry.is_expired(&config, now)) {
                None => Lookup::Miss,
                Some(true) => {
                    if let Some((key, entry)) = entries.pop_entry(key) {
                        removed.push((key, entry.value, RemovalCause::Expired));
                    }
                    Lookup::Miss
                }
                Some(false) => match entries.get_mut(key) {
                    Some(entry) => {
                        entry.mark_accessed(now);
                        Lookup::Hit {
                            value: entry.value.clone(),
                            refresh_due: entry.needs_refresh(&config, now),
                        }
                    }
                    None => Lookup::Miss,
                },
            }
        };

        match result {
            Lookup::Hit { .. } => {
                self.inner.stats.record_hit();
                debug!("Cache hit in '{}'", self.inner.name);
            }
            Lookup::Miss => {
                self.inner.stats.record_miss();
                debug!("Cache miss in '{}'", self.inner.name);
            }
        }

        self.finish_removals(removed);
        result
    }

    /// Live value without touching statistics or recency
    pub(crate) fn peek_live<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let config = self.config();
        let now = Instant::now();
        let entries = self.lock_entries();
        entries
            .peek(key)
            .filter(|entry| !entry.is_expired(&config, now))
            .map(|entry| entry.value.clone())
    }

    /// Check if a live entry exists (without updating access time)
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.peek_live(key).is_some()
    }

    /// Insert or overwrite a value
    ///
    /// Overwriting is silent: only entries that leave the cache are reported.
    /// A closed cache ignores the write.
    pub fn put(&self, key: K, value: V) {
        let removed = self.put_deferred(key, value);
        self.finish_removals(removed);
    }

    /// Insert without reporting; the caller hands the result to `finish_removals`
    pub(crate) fn put_deferred(&self, key: K, value: V) -> Removed<K, V> {
        let config = self.config();
        let now = Instant::now();
        let mut entries = self.lock_entries();
        if self.is_closed() {
            debug!("Ignoring write to closed cache '{}'", self.inner.name);
            return Vec::new();
        }
        entries.put(key, CacheEntry::written_at(value, now));
        Self::enforce_limits(&mut entries, &config, now)
    }

    /// Remove one entry
    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key);
    }

    /// Remove one entry, returning its value if it was still live
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let config = self.config();
        let now = Instant::now();
        let popped = self.lock_entries().pop_entry(key);

        let (key, entry) = popped?;
        if entry.is_expired(&config, now) {
            self.finish_removals(vec![(key, entry.value, RemovalCause::Expired)]);
            return None;
        }

        debug!("Removed cache entry from '{}'", self.inner.name);
        let value = entry.value.clone();
        self.finish_removals(vec![(key, entry.value, RemovalCause::Explicit)]);
        Some(value)
    }

    /// Remove every entry matching the predicate
    pub fn invalidate_entries<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &V) -> bool,
    {
        let removed: Removed<K, V> = {
            let mut entries = self.lock_entries();
            let keys: Vec<K> = entries
                .iter()
                .filter(|(key, entry)| predicate(key, &entry.value))
                .map(|(key, _)| key.clone())
                .collect();

            keys.iter()
                .filter_map(|key| entries.pop_entry(key))
                .map(|(key, entry)| (key, entry.value, RemovalCause::Explicit))
                .collect()
        };

        let count = removed.len();
        if count > 0 {
            info!("Invalidated {} entries in cache '{}'", count, self.inner.name);
        }
        self.finish_removals(removed);
        count
    }

    /// Remove all entries, reporting each one
    pub fn clear(&self) {
        let drained = std::mem::replace(&mut *self.lock_entries(), LruCache::unbounded());

        let removed: Removed<K, V> = drained
            .into_iter()
            .map(|(key, entry)| (key, entry.value, RemovalCause::Cleared))
            .collect();

        info!("Cleared {} entries from cache '{}'", removed.len(), self.inner.name);
        self.finish_removals(removed);
    }

    /// True once the owning manager has closed; the cache stays empty
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Refuse further writes and drop every entry
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.clear();
    }

    /// Remove all expired entries
    pub fn evict_expired(&self) -> usize {
        let config = self.config();
        if !config.has_expiry() {
            return 0;
        }

        let now = Instant::now();
        let removed = Self::drain_expired(&mut self.lock_entries(), &config, now);
        let count = removed.len();
        if count > 0 {
            debug!("Cleaned up {} expired entries from '{}'", count, self.inner.name);
        }
        self.finish_removals(removed);
        count
    }

    /// Re-read the supplier and apply the new limits to the existing entries
    ///
    /// An invalid new configuration is rejected and the old one stays in force.
    pub fn rebuild(&self) -> Result<()> {
        let config = (self.inner.supplier)();
        if let Err(message) = config.validate() {
            warn!("Keeping old config for cache '{}': {}", self.inner.name, message);
            return Err(CacheError::ConfigurationError {
                cache: self.inner.name.clone(),
                message,
            });
        }

        let previous = std::mem::replace(
            &mut *self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            config.clone(),
        );
        if previous != config {
            info!(
                "Rebuilt cache '{}': {:?} -> {:?}",
                self.inner.name, previous, config
            );
        }

        let now = Instant::now();
        let removed = {
            let mut entries = self.lock_entries();
            let mut removed = Self::drain_expired(&mut entries, &config, now);
            removed.extend(Self::enforce_limits(&mut entries, &config, now));
            removed
        };
        self.finish_removals(removed);
        Ok(())
    }

    /// Number of entries held, including expired ones not yet swept
    pub fn size(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Keys of all live entries
    pub fn keys(&self) -> Vec<K> {
        let config = self.config();
        let now = Instant::now();
        self.lock_entries()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(&config, now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Admin listing row; the maximum size is read from the supplier now
    pub fn info(&self) -> CacheInfo {
        self.info_with(false)
    }

    pub(crate) fn info_with(&self, loading: bool) -> CacheInfo {
        let stats = self.stats();
        CacheInfo {
            name: self.inner.name.clone(),
            node: None,
            size: self.size(),
            maximum_size: self.supplied_config().maximum_size,
            config: self.config(),
            loading,
            hit_rate: stats.hit_rate(),
            stats,
        }
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.inner.stats
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries<K, V>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn drain_expired(entries: &mut Entries<K, V>, config: &CacheConfig, now: Instant) -> Removed<K, V> {
        if !config.has_expiry() {
            return Vec::new();
        }

        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(config, now))
            .map(|(key, _)| key.clone())
            .collect();

        expired
            .iter()
            .filter_map(|key| entries.pop_entry(key))
            .map(|(key, entry)| (key, entry.value, RemovalCause::Expired))
            .collect()
    }

    /// Evict least recently used entries until the size bound holds
    ///
    /// Expired entries are dropped first so they never push out live ones.
    fn enforce_limits(entries: &mut Entries<K, V>, config: &CacheConfig, now: Instant) -> Removed<K, V> {
        let Some(maximum) = config.maximum_size else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        if entries.len() as u64 > maximum {
            removed.extend(Self::drain_expired(entries, config, now));
        }

        while entries.len() as u64 > maximum {
            match entries.pop_lru() {
                Some((key, entry)) => removed.push((key, entry.value, RemovalCause::Size)),
                None => break,
            }
        }

        removed
    }

    /// Record and report removals; must be called without the store lock held
    pub(crate) fn finish_removals(&self, removed: Removed<K, V>) {
        for (key, value, cause) in removed {
            match cause {
                RemovalCause::Size => self.inner.stats.record_size_evictions(1),
                RemovalCause::Expired => self.inner.stats.record_expirations(1),
                RemovalCause::Explicit | RemovalCause::Cleared => {
                    self.inner.stats.record_invalidations(1)
                }
            }

            if cause == RemovalCause::Size {
                debug!("Evicting entry from '{}' due to maximum size", self.inner.name);
            }

            if let Some(listener) = &self.inner.listener {
                run_guarded("Removal listener", || {
                    listener(RemovalNotification { key, value, cause })
                });
            }
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for NamedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self
            .inner
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or(0);
        f.debug_struct("NamedCache")
            .field("name", &self.inner.name)
            .field("size", &size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::fixed;
    use std::sync::Arc;
    use std::time::Duration;

    type Notifications = Arc<Mutex<Vec<RemovalNotification<String, String>>>>;

    fn recording_listener() -> (RemovalListener<String, String>, Notifications) {
        let seen: Notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: RemovalListener<String, String> =
            Arc::new(move |notification| sink.lock().unwrap().push(notification));
        (listener, seen)
    }

    fn cache_with(config: CacheConfig) -> (NamedCache<String, String>, Notifications) {
        let (listener, seen) = recording_listener();
        let cache = NamedCache::new("test-cache", fixed(config), Some(listener)).unwrap();
        (cache, seen)
    }

    fn put(cache: &NamedCache<String, String>, key: &str, value: &str) {
        cache.put(key.to_string(), value.to_string());
    }

    #[test]
    fn test_basic_put_and_get() {
        let (cache, _) = cache_with(CacheConfig::unbounded());

        put(&cache, "key1", "value1");

        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let (cache, _) = cache_with(CacheConfig::unbounded());

        assert_eq!(cache.get("nonexistent"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_size_eviction_notifies_lru_entry() {
        let (cache, seen) = cache_with(CacheConfig::builder().maximum_size(2).build());

        put(&cache, "A", "1");
        put(&cache, "B", "2");
        put(&cache, "C", "3");

        assert_eq!(cache.get("A"), None);
        assert_eq!(cache.size(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].key, "A");
        assert_eq!(seen[0].cause, RemovalCause::Size);
        assert_eq!(cache.stats().evictions_size, 1);
    }

    #[test]
    fn test_read_refreshes_recency() {
        let (cache, _) = cache_with(CacheConfig::builder().maximum_size(2).build());

        put(&cache, "A", "1");
        put(&cache, "B", "2");
        assert!(cache.get("A").is_some());
        put(&cache, "C", "3");

        assert!(cache.contains_key("A"));
        assert!(!cache.contains_key("B"));
    }

    #[test]
    fn test_size_bound_holds_for_long_sequences() {
        let (cache, seen) = cache_with(CacheConfig::builder().maximum_size(10).build());

        for i in 0..100 {
            cache.put(format!("key{}", i), format!("value{}", i));
            assert!(cache.size() <= 10);
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 90);
        let mut keys: Vec<_> = seen.iter().map(|n| n.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 90);
    }

    #[test]
    fn test_overwrite_is_silent() {
        let (cache, seen) = cache_with(CacheConfig::unbounded());

        put(&cache, "key1", "old");
        put(&cache, "key1", "new");

        assert_eq!(cache.get("key1"), Some("new".to_string()));
        assert_eq!(cache.size(), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_invalidate_notifies_explicit() {
        let (cache, seen) = cache_with(CacheConfig::unbounded());

        put(&cache, "key1", "value1");
        cache.invalidate("key1");
        cache.invalidate("never-inserted");

        assert!(cache.get("key1").is_none());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].value, "value1");
        assert_eq!(seen[0].cause, RemovalCause::Explicit);
    }

    #[test]
    fn test_remove_returns_value() {
        let (cache, _) = cache_with(CacheConfig::unbounded());

        put(&cache, "key1", "value1");

        assert_eq!(cache.remove("key1"), Some("value1".to_string()));
        assert_eq!(cache.remove("key1"), None);
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_clear_notifies_every_entry() {
        let (cache, seen) = cache_with(CacheConfig::unbounded());

        put(&cache, "key1", "value1");
        put(&cache, "key2", "value2");
        put(&cache, "key3", "value3");

        cache.clear();

        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|n| n.cause == RemovalCause::Cleared));
    }

    #[test]
    fn test_closed_cache_ignores_writes() {
        let (cache, seen) = cache_with(CacheConfig::unbounded());
        put(&cache, "key1", "value1");

        cache.close();
        put(&cache, "key2", "value2");

        assert!(cache.is_closed());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get("key2"), None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_expire_after_write() {
        let (cache, seen) = cache_with(
            CacheConfig::builder()
                .expire_after_write(Duration::from_millis(100))
                .build(),
        );

        put(&cache, "k", "v");

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        std::thread::sleep(Duration::from_millis(140));
        assert_eq!(cache.get("k"), None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].cause, RemovalCause::Expired);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_expire_after_access() {
        let (cache, _) = cache_with(
            CacheConfig::builder()
                .expire_after_access(Duration::from_millis(100))
                .build(),
        );

        put(&cache, "k", "v");
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(50));
            assert!(cache.get("k").is_some());
        }

        std::thread::sleep(Duration::from_millis(150));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_evict_expired_sweep() {
        let (cache, seen) = cache_with(
            CacheConfig::builder()
                .expire_after_write(Duration::from_millis(50))
                .build(),
        );

        put(&cache, "key1", "value1");
        put(&cache, "key2", "value2");

        std::thread::sleep(Duration::from_millis(100));
        put(&cache, "key3", "value3");

        assert_eq!(cache.evict_expired(), 2);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.keys(), vec!["key3".to_string()]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_rebuild_applies_new_maximum() {
        let live = Arc::new(RwLock::new(CacheConfig::builder().maximum_size(5).build()));
        let source = live.clone();
        let supplier: ConfigSupplier = Arc::new(move || source.read().unwrap().clone());
        let cache: NamedCache<String, String> = NamedCache::new("live", supplier, None).unwrap();

        for i in 0..5 {
            cache.put(format!("key{}", i), "value".to_string());
        }

        *live.write().unwrap() = CacheConfig::builder().maximum_size(2).build();

        // Listing reads the supplier, the store keeps its old limit until rebuilt
        assert_eq!(cache.info().maximum_size, Some(2));
        assert_eq!(cache.size(), 5);

        cache.rebuild().unwrap();
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.config().maximum_size, Some(2));
        assert!(cache.contains_key("key4"));
        assert!(cache.contains_key("key3"));
    }

    #[test]
    fn test_rebuild_rejects_invalid_config() {
        let live = Arc::new(RwLock::new(CacheConfig::builder().maximum_size(5).build()));
        let source = live.clone();
        let supplier: ConfigSupplier = Arc::new(move || source.read().unwrap().clone());
        let cache: NamedCache<String, String> = NamedCache::new("live", supplier, None).unwrap();

        *live.write().unwrap() = CacheConfig::builder().maximum_size(0).build();

        let error = cache.rebuild().unwrap_err();
        assert!(matches!(error, CacheError::ConfigurationError { .. }));
        assert_eq!(cache.config().maximum_size, Some(5));
    }

    #[test]
    fn test_invalid_name_and_config() {
        let result: Result<NamedCache<String, String>> =
            NamedCache::new("  ", fixed(CacheConfig::unbounded()), None);
        assert!(matches!(result, Err(CacheError::InvalidName(_))));

        let result: Result<NamedCache<String, String>> = NamedCache::new(
            "bad",
            fixed(CacheConfig::builder().maximum_size(0).build()),
            None,
        );
        assert!(matches!(result, Err(CacheError::ConfigurationError { .. })));
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let listener: RemovalListener<String, String> =
            Arc::new(|_| panic!("listener failure"));
        let cache =
            NamedCache::new("panics", fixed(CacheConfig::unbounded()), Some(listener)).unwrap();

        cache.put("key1".to_string(), "value1".to_string());
        cache.put("key2".to_string(), "value2".to_string());
        cache.clear();

        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_listener_may_reenter_cache() {
        let holder: Arc<Mutex<Option<NamedCache<String, String>>>> = Arc::new(Mutex::new(None));
        let reentry = holder.clone();
        let listener: RemovalListener<String, String> = Arc::new(move |notification| {
            if let Some(cache) = reentry.lock().unwrap().as_ref() {
                cache.put(format!("evicted:{}", notification.key), notification.value);
            }
        });
        let cache = NamedCache::new("reentrant", fixed(CacheConfig::unbounded()), Some(listener))
            .unwrap();
        *holder.lock().unwrap() = Some(cache.clone());

        cache.put("key1".to_string(), "value1".to_string());
        cache.invalidate("key1");

        assert_eq!(cache.get("evicted:key1"), Some("value1".to_string()));
    }

    #[test]
    fn test_invalidate_entries_by_predicate() {
        let (cache, seen) = cache_with(CacheConfig::unbounded());

        put(&cache, "alice:1", "a");
        put(&cache, "alice:2", "b");
        put(&cache, "bob:1", "c");

        let removed = cache.invalidate_entries(|key, _| key.starts_with("alice:"));

        assert_eq!(removed, 2);
        assert_eq!(cache.keys(), vec!["bob:1".to_string()]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_clones_share_storage() {
        let (cache, _) = cache_with(CacheConfig::unbounded());
        let other = cache.clone();

        put(&cache, "key1", "value1");
        assert_eq!(other.get("key1"), Some("value1".to_string()));

        other.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let (cache, seen) = cache_with(CacheConfig::builder().maximum_size(50).build());

        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        let key = format!("t{}-{}", t, i % 40);
                        cache.put(key.clone(), i.to_string());
                        cache.get(key.as_str());
                        if i % 50 == 0 {
                            cache.clear();
                        }
                    }
                });
            }
        });

        assert!(cache.size() <= 50);
        let stats = cache.stats();
        let removals = seen.lock().unwrap().len() as u64;
        assert_eq!(removals, stats.evictions_size + stats.invalidations);
    }
}
