//! Process-wide registry of named caches
//!
//! A [`CacheManager`] is created once per process and handed to every
//! component that needs a cache. It owns the name → cache mapping, the
//! collaborators that take part in "clear everything", and the shared
//! background task that sweeps expired entries.

use crate::cache::{
    config::{CacheConfig, ConfigSupplier},
    invalidation::{run_guarded, RemovalListener},
    loading::{Loader, LoadingNamedCache},
    store::NamedCache,
    types::{CacheInfo, CacheName},
};
use crate::error::{CacheError, Result};
use dashmap::{mapref::entry::Entry, DashMap};
use std::any::Any;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Anything that can be told to discard all of its state
pub trait Clearable: Send + Sync {
    fn clear(&self);
}

/// Type-erased view of a registered cache used for admin operations
pub trait ManagedCache: Clearable {
    fn name(&self) -> &str;

    fn size(&self) -> usize;

    fn evict_expired(&self) -> usize;

    fn rebuild(&self) -> Result<()>;

    fn info(&self) -> CacheInfo;

    /// Configuration in force
    fn config(&self) -> CacheConfig;

    /// Configuration the cache's supplier returns right now
    fn supplied_config(&self) -> CacheConfig;

    /// Drop every entry and ignore later writes and loads
    fn close(&self);
}

/// Adapts a closure into a [`Clearable`]
pub struct ClearFn<F>(pub F);

impl<F: Fn() + Send + Sync> Clearable for ClearFn<F> {
    fn clear(&self) {
        (self.0)()
    }
}

impl<K, V> Clearable for NamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clear(&self) {
        NamedCache::clear(self)
    }
}

impl<K, V> ManagedCache for NamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        NamedCache::name(self)
    }

    fn size(&self) -> usize {
        NamedCache::size(self)
    }

    fn evict_expired(&self) -> usize {
        NamedCache::evict_expired(self)
    }

    fn rebuild(&self) -> Result<()> {
        NamedCache::rebuild(self)
    }

    fn info(&self) -> CacheInfo {
        NamedCache::info(self)
    }

    fn config(&self) -> CacheConfig {
        NamedCache::config(self)
    }

    fn supplied_config(&self) -> CacheConfig {
        NamedCache::supplied_config(self)
    }

    fn close(&self) {
        NamedCache::close(self)
    }
}

impl<K, V> Clearable for LoadingNamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clear(&self) {
        LoadingNamedCache::clear(self)
    }
}

impl<K, V> ManagedCache for LoadingNamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        LoadingNamedCache::name(self)
    }

    fn size(&self) -> usize {
        LoadingNamedCache::size(self)
    }

    fn evict_expired(&self) -> usize {
        LoadingNamedCache::evict_expired(self)
    }

    fn rebuild(&self) -> Result<()> {
        LoadingNamedCache::rebuild(self)
    }

    fn info(&self) -> CacheInfo {
        LoadingNamedCache::info(self)
    }

    fn config(&self) -> CacheConfig {
        LoadingNamedCache::config(self)
    }

    fn supplied_config(&self) -> CacheConfig {
        LoadingNamedCache::supplied_config(self)
    }

    fn close(&self) {
        LoadingNamedCache::close(self)
    }
}

struct Registration {
    cache: Arc<dyn ManagedCache>,
    /// The typed handle, so re-registration can hand back the same instance
    handle: Box<dyn Any + Send + Sync>,
}

impl Registration {
    fn new<T>(cache: T) -> Self
    where
        T: ManagedCache + Clone + 'static,
    {
        Self {
            cache: Arc::new(cache.clone()),
            handle: Box::new(cache),
        }
    }
}

/// Registry mapping unique cache names to live caches
///
/// At most one cache exists per name. Creating a cache under a name that is
/// already taken returns the existing instance when the key and value types
/// match and the requested supplier currently yields the same configuration
/// as the registered one; anything else is a
/// [`CacheError::DuplicateRegistration`]. For loading caches the first
/// registered loader is kept.
///
/// After [`close`](CacheManager::close) every operation fails with
/// [`CacheError::ManagerClosed`], and handles obtained earlier stay empty:
/// writes are ignored and loads fail.
#[derive(Default)]
pub struct CacheManager {
    /// Node this registry runs on, stamped on listing rows
    node_name: Option<String>,
    caches: DashMap<CacheName, Registration>,
    clearables: RwLock<Vec<Arc<dyn Clearable>>>,
    /// Closed flag; creation holds the read side so close cannot interleave
    closed: RwLock<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose listing rows name the node they were read on
    pub fn for_node(node_name: impl Into<String>) -> Self {
        let mut manager = Self::default();
        manager.node_name = Some(node_name.into());
        manager
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    /// Create a cache, or return the one already registered under `name`
    pub fn create<K, V>(
        &self,
        name: &str,
        supplier: ConfigSupplier,
        listener: Option<RemovalListener<K, V>>,
    ) -> Result<NamedCache<K, V>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.register(name, supplier, |supplier| {
            NamedCache::new(name, supplier, listener)
        })
    }

    /// Create a loading cache, or return the one already registered under `name`
    pub fn create_loading<K, V>(
        &self,
        name: &str,
        supplier: ConfigSupplier,
        loader: Loader<K, V>,
        listener: Option<RemovalListener<K, V>>,
    ) -> Result<LoadingNamedCache<K, V>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.register(name, supplier, |supplier| {
            LoadingNamedCache::new(name, supplier, loader, listener)
        })
    }

    /// Suppliers and constructors run without any registry lock held, so they
    /// may call back into the manager
    fn register<T, F>(&self, name: &str, supplier: ConfigSupplier, build: F) -> Result<T>
    where
        T: ManagedCache + Clone + 'static,
        F: FnOnce(ConfigSupplier) -> Result<T>,
    {
        let _open = self.ensure_open()?;

        if name.trim().is_empty() {
            return Err(CacheError::InvalidName(name.to_string()));
        }

        let requested = supplier();
        if let Some(cache) = self.existing(name, &requested)? {
            return Ok(cache);
        }

        let cache = build(supplier)?;
        let inserted = match self.caches.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Registration::new(cache.clone()));
                true
            }
            Entry::Occupied(_) => false,
        };

        if inserted {
            info!("Registered cache '{}'", name);
            return Ok(cache);
        }

        // Another caller registered the name while this one was building
        self.existing(name, &requested)?
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))
    }

    /// The registered instance, if `name` is taken by a compatible cache
    fn existing<T>(&self, name: &str, requested: &CacheConfig) -> Result<Option<T>>
    where
        T: ManagedCache + Clone + 'static,
    {
        let Some((cache, handle)) = self.caches.get(name).map(|registration| {
            (
                Arc::clone(&registration.cache),
                registration.handle.downcast_ref::<T>().cloned(),
            )
        }) else {
            return Ok(None);
        };

        let handle = handle.ok_or_else(|| CacheError::DuplicateRegistration {
            name: name.to_string(),
            reason: "registered with a different cache, key or value type".to_string(),
        })?;

        let registered = cache.supplied_config();
        if &registered != requested {
            return Err(CacheError::DuplicateRegistration {
                name: name.to_string(),
                reason: format!("registered with {:?}, requested {:?}", registered, requested),
            });
        }

        debug!("Reusing registered cache '{}'", name);
        Ok(Some(handle))
    }

    /// Typed handle of a registered plain cache
    pub fn cache<K, V>(&self, name: &str) -> Result<NamedCache<K, V>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.typed(name)
    }

    /// Typed handle of a registered loading cache
    pub fn loading_cache<K, V>(&self, name: &str) -> Result<LoadingNamedCache<K, V>>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.typed(name)
    }

    fn typed<T: Clone + 'static>(&self, name: &str) -> Result<T> {
        let _open = self.ensure_open()?;
        let registration = self
            .caches
            .get(name)
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))?;
        registration
            .handle
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| CacheError::DuplicateRegistration {
                name: name.to_string(),
                reason: "requested with a different cache, key or value type".to_string(),
            })
    }

    /// Type-erased handle of a registered cache
    pub fn find(&self, name: &str) -> Result<Option<Arc<dyn ManagedCache>>> {
        let _open = self.ensure_open()?;
        Ok(self
            .caches
            .get(name)
            .map(|registration| Arc::clone(&registration.cache)))
    }

    /// Every registered cache, keyed by name
    pub fn get_all(&self) -> Result<BTreeMap<CacheName, Arc<dyn ManagedCache>>> {
        Ok(self.snapshot()?.into_iter().collect())
    }

    pub fn cache_names(&self) -> Result<Vec<CacheName>> {
        Ok(self.get_all()?.into_keys().collect())
    }

    /// Admin listing, sorted by name
    pub fn list_caches(&self) -> Result<Vec<CacheInfo>> {
        Ok(self
            .get_all()?
            .values()
            .map(|cache| self.stamped(cache.info()))
            .collect())
    }

    /// Listing row of one cache
    pub fn cache_info(&self, name: &str) -> Result<CacheInfo> {
        let cache = self
            .find(name)?
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))?;
        Ok(self.stamped(cache.info()))
    }

    fn stamped(&self, info: CacheInfo) -> CacheInfo {
        CacheInfo {
            node: self.node_name.clone(),
            ..info
        }
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Clear one cache; an unknown name is [`CacheError::CacheNotFound`]
    pub fn clear_cache(&self, name: &str) -> Result<()> {
        let cache = self
            .find(name)?
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))?;
        info!("Clearing cache '{}'", name);
        cache.clear();
        Ok(())
    }

    /// Clear every cache and every registered collaborator
    ///
    /// Returns the number of caches cleared.
    pub fn clear_all(&self) -> Result<usize> {
        let caches = self.snapshot()?;
        for (name, cache) in &caches {
            debug!("Clearing cache '{}'", name);
            cache.clear();
        }

        let clearables = self
            .clearables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for clearable in &clearables {
            run_guarded("Clearable collaborator", || clearable.clear());
        }

        info!(
            "Cleared {} caches and {} collaborators",
            caches.len(),
            clearables.len()
        );
        Ok(caches.len())
    }

    /// Clear one cache by name, or all of them when `name` is `None`
    ///
    /// Returns the number of caches cleared.
    pub fn clear_matching(&self, name: Option<&str>) -> Result<u64> {
        match name {
            Some(name) => self.clear_cache(name).map(|_| 1),
            None => self.clear_all().map(|count| count as u64),
        }
    }

    /// Re-read one cache's configuration and apply it
    pub fn rebuild(&self, name: &str) -> Result<()> {
        self.find(name)?
            .ok_or_else(|| CacheError::CacheNotFound(name.to_string()))?
            .rebuild()
    }

    /// Rebuild every cache, returning how many accepted their new configuration
    ///
    /// A cache whose new configuration is invalid keeps its old one.
    pub fn rebuild_all(&self) -> Result<usize> {
        let mut rebuilt = 0;
        for (name, cache) in self.snapshot()? {
            match cache.rebuild() {
                Ok(()) => rebuilt += 1,
                Err(e) => warn!("Failed to rebuild cache '{}': {}", name, e),
            }
        }
        Ok(rebuilt)
    }

    /// Sweep expired entries from every cache
    pub fn evict_expired_all(&self) -> Result<usize> {
        let evicted: usize = self
            .snapshot()?
            .iter()
            .map(|(_, cache)| cache.evict_expired())
            .sum();
        if evicted > 0 {
            debug!("Swept {} expired entries", evicted);
        }
        Ok(evicted)
    }

    /// Take part in [`clear_all`](CacheManager::clear_all)
    pub fn register_clearable(&self, clearable: Arc<dyn Clearable>) -> Result<()> {
        let _open = self.ensure_open()?;
        self.clearables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(clearable);
        Ok(())
    }

    /// Start the background task sweeping expired entries every `interval`
    ///
    /// The task holds only a weak reference and ends once the manager is
    /// dropped or closed. Calling this again replaces the running task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let _open = self.ensure_open()?;
        if interval.is_zero() {
            return Err(CacheError::ConfigurationError {
                cache: "sweeper".to_string(),
                message: "sweep interval must be greater than 0".to_string(),
            });
        }
        let manager = Arc::downgrade(self);

        info!("Starting cache sweeper (interval: {:?})", interval);
        let handle = tokio::spawn(sweep_loop(manager, interval));

        if let Some(previous) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close every cache, release the registry and stop the sweeper
    ///
    /// Idempotent. Every later operation fails with [`CacheError::ManagerClosed`].
    pub fn close(&self) {
        {
            let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
            if *closed {
                debug!("Cache manager already closed");
                return;
            }
            *closed = true;
        }

        if let Some(sweeper) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }

        let caches: Vec<Arc<dyn ManagedCache>> = self
            .caches
            .iter()
            .map(|registration| Arc::clone(&registration.cache))
            .collect();
        self.caches.clear();
        for cache in &caches {
            cache.close();
        }
        self.clearables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        info!("Closed cache manager ({} caches released)", caches.len());
    }

    fn ensure_open(&self) -> Result<RwLockReadGuard<'_, bool>> {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(CacheError::ManagerClosed);
        }
        Ok(closed)
    }

    /// Registered caches, collected so no map guard is held while calling into them
    fn snapshot(&self) -> Result<Vec<(CacheName, Arc<dyn ManagedCache>)>> {
        let _open = self.ensure_open()?;
        Ok(self
            .caches
            .iter()
            .map(|registration| {
                (
                    registration.key().clone(),
                    Arc::clone(&registration.cache),
                )
            })
            .collect())
    }
}

async fn sweep_loop(manager: Weak<CacheManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(registry) = manager.upgrade() else {
            break;
        };
        match registry.evict_expired_all() {
            Ok(evicted) => {
                if evicted > 0 {
                    debug!("Sweeper removed {} expired entries", evicted);
                }
            }
            Err(CacheError::ManagerClosed) => break,
            Err(e) => warn!("Cache sweep failed: {}", e),
        }
    }

    debug!("Cache sweeper stopped");
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::fixed;
    use crate::cache::loading::loader_fn;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bounded(size: u64) -> ConfigSupplier {
        fixed(CacheConfig::builder().maximum_size(size).build())
    }

    #[test]
    fn test_create_registers_cache() {
        let manager = CacheManager::new();

        let cache: NamedCache<String, String> = manager.create("feeds", bounded(10), None).unwrap();
        cache.put("RAW".to_string(), "feed".to_string());

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.cache_names().unwrap(), vec!["feeds".to_string()]);
        assert_eq!(manager.find("feeds").unwrap().unwrap().size(), 1);
        assert!(manager.find("missing").unwrap().is_none());
    }

    #[test]
    fn test_recreate_returns_same_instance() {
        let manager = CacheManager::new();

        let first: NamedCache<String, u32> = manager.create("users", bounded(10), None).unwrap();
        first.put("alice".to_string(), 1);

        let second: NamedCache<String, u32> = manager.create("users", bounded(10), None).unwrap();
        assert_eq!(second.get("alice"), Some(1));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_recreate_with_different_config_fails() {
        let manager = CacheManager::new();
        let _cache: NamedCache<String, u32> = manager.create("users", bounded(10), None).unwrap();

        let result: Result<NamedCache<String, u32>> = manager.create("users", bounded(20), None);
        assert!(matches!(result, Err(CacheError::DuplicateRegistration { .. })));
    }

    #[test]
    fn test_recreate_after_live_config_change() {
        let manager = CacheManager::new();
        let limit = Arc::new(RwLock::new(10));
        let live = Arc::clone(&limit);
        let supplier: ConfigSupplier = Arc::new(move || {
            let size = *live.read().unwrap();
            CacheConfig::builder().maximum_size(size).build()
        });

        let first: NamedCache<String, u32> =
            manager.create("feeds", supplier.clone(), None).unwrap();
        first.put("RAW".to_string(), 1);

        *limit.write().unwrap() = 20;
        let second: NamedCache<String, u32> = manager.create("feeds", supplier, None).unwrap();

        assert_eq!(second.get("RAW"), Some(1));
        assert_eq!(second.config().maximum_size, Some(10));
        assert_eq!(manager.cache_info("feeds").unwrap().maximum_size, Some(20));
    }

    #[test]
    fn test_supplier_may_call_back_into_manager() {
        let manager = Arc::new(CacheManager::new());
        let _first: NamedCache<String, u32> = manager.create("a", bounded(5), None).unwrap();

        let registry = Arc::downgrade(&manager);
        let supplier: ConfigSupplier = Arc::new(move || {
            let known = registry
                .upgrade()
                .and_then(|manager| manager.list_caches().ok())
                .map(|caches| caches.len() as u64)
                .unwrap_or(0);
            CacheConfig::builder().maximum_size(known + 1).build()
        });

        let second: Result<NamedCache<String, u32>> = manager.create("b", supplier, None);
        assert!(second.is_ok());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_recreate_with_different_types_fails() {
        let manager = CacheManager::new();
        let _cache: NamedCache<String, u32> = manager.create("users", bounded(10), None).unwrap();

        let result: Result<NamedCache<String, String>> = manager.create("users", bounded(10), None);
        assert!(matches!(result, Err(CacheError::DuplicateRegistration { .. })));

        let result: Result<NamedCache<u64, u32>> = manager.cache("users");
        assert!(matches!(result, Err(CacheError::DuplicateRegistration { .. })));
    }

    #[test]
    fn test_empty_name_rejected() {
        let manager = CacheManager::new();
        let result: Result<NamedCache<String, u32>> = manager.create("", bounded(10), None);
        assert!(matches!(result, Err(CacheError::InvalidName(_))));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_invalid_config_not_registered() {
        let manager = CacheManager::new();
        let result: Result<NamedCache<String, u32>> = manager.create("bad", bounded(0), None);
        assert!(matches!(result, Err(CacheError::ConfigurationError { .. })));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_list_caches_sorted_by_name() {
        let manager = CacheManager::new();
        for name in ["zeta", "alpha", "mid"] {
            let _cache: NamedCache<String, String> = manager.create(name, bounded(5), None).unwrap();
        }

        let names: Vec<_> = manager
            .list_caches()
            .unwrap()
            .into_iter()
            .map(|info| info.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_clear_cache_unknown_name() {
        let manager = CacheManager::new();
        let error = manager.clear_cache("nope").unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_clear_all_includes_collaborators() {
        let manager = CacheManager::new();
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = cleared.clone();
        manager
            .register_clearable(Arc::new(ClearFn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })))
            .unwrap();
        manager
            .register_clearable(Arc::new(ClearFn(|| {
                panic!("broken collaborator");
            })))
            .unwrap();

        let a: NamedCache<String, String> = manager.create("a", bounded(5), None).unwrap();
        let b: NamedCache<String, String> = manager.create("b", bounded(5), None).unwrap();
        a.put("k".to_string(), "v".to_string());
        b.put("k".to_string(), "v".to_string());

        assert_eq!(manager.clear_all().unwrap(), 2);
        assert_eq!(a.size(), 0);
        assert_eq!(b.size(), 0);
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_matching() {
        let manager = CacheManager::new();
        let a: NamedCache<String, String> = manager.create("a", bounded(5), None).unwrap();
        let b: NamedCache<String, String> = manager.create("b", bounded(5), None).unwrap();
        a.put("k".to_string(), "v".to_string());
        b.put("k".to_string(), "v".to_string());

        assert_eq!(manager.clear_matching(Some("a")).unwrap(), 1);
        assert_eq!(a.size(), 0);
        assert_eq!(b.size(), 1);

        assert_eq!(manager.clear_matching(None).unwrap(), 2);
        assert_eq!(b.size(), 0);
    }

    #[tokio::test]
    async fn test_loading_cache_registration() {
        let manager = CacheManager::new();
        let loader = loader_fn(|key: String| async move { Ok::<usize, BoxError>(key.len()) });

        let cache = manager
            .create_loading("lengths", bounded(5), loader, None)
            .unwrap();
        assert_eq!(cache.get("four").await.unwrap(), 4);

        let typed: LoadingNamedCache<String, usize> = manager.loading_cache("lengths").unwrap();
        assert_eq!(typed.get_if_present("four"), Some(4));

        let info = &manager.list_caches().unwrap()[0];
        assert!(info.loading);

        let plain: Result<NamedCache<String, usize>> = manager.cache("lengths");
        assert!(plain.is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let manager = CacheManager::new();
        let cache: NamedCache<String, String> = manager.create("a", bounded(5), None).unwrap();
        cache.put("k".to_string(), "v".to_string());

        manager.close();
        manager.close();

        assert!(manager.is_closed());
        assert!(manager.is_empty());
        assert_eq!(cache.size(), 0);

        let result: Result<NamedCache<String, String>> = manager.create("b", bounded(5), None);
        assert!(matches!(result, Err(CacheError::ManagerClosed)));
        assert!(matches!(manager.list_caches(), Err(CacheError::ManagerClosed)));
        assert!(matches!(manager.clear_all(), Err(CacheError::ManagerClosed)));
    }

    #[tokio::test]
    async fn test_handles_stay_empty_after_close() {
        let manager = CacheManager::new();
        let plain: NamedCache<String, String> = manager.create("plain", bounded(5), None).unwrap();
        let loading: LoadingNamedCache<String, String> = manager
            .create_loading(
                "loading",
                bounded(5),
                loader_fn(|key: String| async move { Ok::<String, BoxError>(key) }),
                None,
            )
            .unwrap();

        manager.close();

        plain.put("x".to_string(), "y".to_string());
        assert!(plain.is_closed());
        assert_eq!(plain.size(), 0);
        assert!(plain.get("x").is_none());

        assert!(matches!(loading.get("x").await, Err(CacheError::ManagerClosed)));
        assert_eq!(loading.size(), 0);
    }

    #[test]
    fn test_listing_rows_name_the_node() {
        let manager = CacheManager::for_node("node1");
        let _cache: NamedCache<String, u32> = manager.create("feeds", bounded(5), None).unwrap();

        assert_eq!(manager.node_name(), Some("node1"));
        assert_eq!(manager.list_caches().unwrap()[0].node.as_deref(), Some("node1"));
        assert_eq!(manager.cache_info("feeds").unwrap().node.as_deref(), Some("node1"));
        assert!(matches!(
            manager.cache_info("missing"),
            Err(CacheError::CacheNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let manager = Arc::new(CacheManager::new());
        let cache: NamedCache<String, String> = manager
            .create(
                "short-lived",
                fixed(
                    CacheConfig::builder()
                        .expire_after_write(Duration::from_millis(20))
                        .build(),
                ),
                None,
            )
            .unwrap();
        cache.put("k".to_string(), "v".to_string());

        manager.spawn_sweeper(Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().expirations, 1);
        manager.close();
    }
}
