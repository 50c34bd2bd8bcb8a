//! Loading cache with per-key load collapsing
//!
//! A [`LoadingNamedCache`] wraps a [`NamedCache`] with a loader. Concurrent
//! misses for the same key share a single loader invocation: the first caller
//! registers an in-flight marker and spawns the load, later callers subscribe
//! to the marker and receive the same outcome, value or error.
//!
//! Loads run as their own tasks. A caller that stops waiting (timeout or
//! cancellation) does not cancel the load; other waiters still get the result
//! and a successful value is still cached.
//!
//! Lock order is always in-flight map first, then store.

use crate::cache::{
    config::{CacheConfig, ConfigSupplier},
    invalidation::{panic_message, RemovalListener},
    store::{Lookup, NamedCache},
    types::{CacheInfo, CacheStats},
};
use crate::error::{BoxError, CacheError, Result};
use futures::future::{BoxFuture, FutureExt};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Computes the value for a missing key
pub type Loader<K, V> =
    Arc<dyn Fn(K) -> BoxFuture<'static, std::result::Result<V, BoxError>> + Send + Sync>;

/// Wrap an async closure as a [`Loader`]
pub fn loader_fn<K, V, F, Fut>(f: F) -> Loader<K, V>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

#[derive(Debug, Error)]
#[error("loader panicked: {0}")]
struct LoaderPanicked(String);

#[derive(Debug, Error)]
#[error("load task ended without a result")]
struct LoadAbandoned;

type Outcome<V> = Option<Result<V>>;

type EntryPredicate<K, V> = Arc<dyn Fn(&K, &V) -> bool + Send + Sync>;

type InFlightMap<K, V> = HashMap<K, Arc<InFlight<K, V>>>;

/// Marker for a load in progress; waiters subscribe to `outcome`
struct InFlight<K, V> {
    id: u64,
    /// Cache generation when the load started; a clear bumps it
    generation: u64,
    /// Set when the key was invalidated or written while loading
    superseded: AtomicBool,
    /// `invalidate_entries` predicates issued while loading; a matching
    /// value is not cached
    discard_if: Mutex<Vec<EntryPredicate<K, V>>>,
    outcome: watch::Sender<Outcome<V>>,
}

struct Shared<K, V> {
    loader: Loader<K, V>,
    in_flight: Mutex<InFlightMap<K, V>>,
    generation: AtomicU64,
    next_id: AtomicU64,
}

enum Fetch<V> {
    Ready(V),
    Pending(watch::Receiver<Outcome<V>>),
}

/// Named cache that computes missing values with a loader
pub struct LoadingNamedCache<K, V> {
    store: NamedCache<K, V>,
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for LoadingNamedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> LoadingNamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        supplier: ConfigSupplier,
        loader: Loader<K, V>,
        listener: Option<RemovalListener<K, V>>,
    ) -> Result<Self> {
        Ok(Self {
            store: NamedCache::new(name, supplier, listener)?,
            shared: Arc::new(Shared {
                loader,
                in_flight: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// Return the cached value, loading it if absent
    ///
    /// Concurrent callers for the same key share one loader invocation. A
    /// failed load is returned to every waiter and nothing is cached, so the
    /// next call retries. Fails with [`CacheError::ManagerClosed`] once the
    /// owning manager has closed.
    pub async fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if self.store.is_closed() {
            return Err(CacheError::ManagerClosed);
        }
        match self.start_or_join(key) {
            Fetch::Ready(value) => Ok(value),
            Fetch::Pending(receiver) => self.wait(receiver).await,
        }
    }

    /// Like [`get`](Self::get) but stop waiting after `timeout`
    ///
    /// The load itself keeps running and its value is cached when it arrives.
    pub async fn get_with_timeout<Q>(&self, key: &Q, timeout: Duration) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        tokio::time::timeout(timeout, self.get(key))
            .await
            .map_err(|_| CacheError::LoadTimeout {
                cache: self.name().to_string(),
                timeout,
            })?
    }

    /// Cached value only; never invokes the loader
    pub fn get_if_present<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.get(key)
    }

    /// Insert a value; a load in flight for the key no longer overwrites it
    pub fn put(&self, key: K, value: V) {
        let removed = {
            let in_flight = self.lock_in_flight();
            if let Some(flight) = in_flight.get(&key) {
                flight.superseded.store(true, Ordering::SeqCst);
            }
            self.store.put_deferred(key, value)
        };
        self.store.finish_removals(removed);
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.contains_key(key)
    }

    /// Remove one entry; a load in flight for the key is not cached
    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key);
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(flight) = self.lock_in_flight().get(key) {
            flight.superseded.store(true, Ordering::SeqCst);
        }
        self.store.remove(key)
    }

    /// Remove matching entries
    ///
    /// Loads in flight keep the predicate and skip caching a value it
    /// matches. The predicate then runs under the in-flight lock, so it must
    /// not call back into this cache.
    pub fn invalidate_entries<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        let predicate: EntryPredicate<K, V> = Arc::new(predicate);
        for flight in self.lock_in_flight().values() {
            flight
                .discard_if
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::clone(&predicate));
        }
        self.store
            .invalidate_entries(|key, value| predicate(key, value))
    }

    /// Remove all entries; loads started before the clear are not cached
    pub fn clear(&self) {
        {
            let _in_flight = self.lock_in_flight();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.store.clear();
    }

    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn evict_expired(&self) -> usize {
        self.store.evict_expired()
    }

    pub fn rebuild(&self) -> Result<()> {
        self.store.rebuild()
    }

    pub fn config(&self) -> CacheConfig {
        self.store.config()
    }

    pub fn supplied_config(&self) -> CacheConfig {
        self.store.supplied_config()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    /// Refuse further loads and writes; loads already running still answer
    /// their waiters but are not cached
    pub(crate) fn close(&self) {
        {
            let _in_flight = self.lock_in_flight();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.store.close();
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn info(&self) -> CacheInfo {
        self.store.info_with(true)
    }

    /// Number of loads currently running
    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn start_or_join<Q>(&self, key: &Q) -> Fetch<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Lookup::Hit { value, refresh_due } = self.store.lookup(key) {
            if refresh_due {
                self.refresh(key.to_owned());
            }
            return Fetch::Ready(value);
        }

        let mut in_flight = self.lock_in_flight();
        if let Some(flight) = in_flight.get(key) {
            debug!("Joining in-flight load in cache '{}'", self.name());
            return Fetch::Pending(flight.outcome.subscribe());
        }

        // A load may have completed between the lookup and taking the lock
        if let Some(value) = self.store.peek_live(key) {
            return Fetch::Ready(value);
        }

        let flight = self.begin_load(&mut in_flight, key.to_owned());
        Fetch::Pending(flight.outcome.subscribe())
    }

    /// Reload a stale entry in the background, keeping the old value meanwhile
    fn refresh(&self, key: K) {
        let mut in_flight = self.lock_in_flight();
        if in_flight.contains_key(&key) {
            return;
        }
        debug!("Refreshing stale entry in cache '{}'", self.name());
        self.begin_load(&mut in_flight, key);
    }

    fn begin_load(&self, in_flight: &mut InFlightMap<K, V>, key: K) -> Arc<InFlight<K, V>> {
        let (outcome, _) = watch::channel(None);
        let flight = Arc::new(InFlight {
            id: self.shared.next_id.fetch_add(1, Ordering::Relaxed),
            generation: self.shared.generation.load(Ordering::SeqCst),
            superseded: AtomicBool::new(false),
            discard_if: Mutex::new(Vec::new()),
            outcome,
        });
        in_flight.insert(key.clone(), Arc::clone(&flight));

        let cache = self.clone();
        let task_flight = Arc::clone(&flight);
        let loader = Arc::clone(&self.shared.loader);
        tokio::spawn(async move {
            let load_key = key.clone();
            let result = AssertUnwindSafe(async move { loader(load_key).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Box::new(LoaderPanicked(panic_message(&*panic))) as BoxError)
                });
            cache.complete(key, &task_flight, result);
        });

        flight
    }

    fn complete(&self, key: K, flight: &InFlight<K, V>, result: std::result::Result<V, BoxError>) {
        let outcome = result.map_err(|source| CacheError::load_failed(self.name(), source));

        let removed = {
            let mut in_flight = self.lock_in_flight();
            let removed = match &outcome {
                Ok(value) if self.still_wanted(&key, flight, value) => {
                    self.store.put_deferred(key.clone(), value.clone())
                }
                Ok(_) => {
                    debug!("Discarding load invalidated while running in cache '{}'", self.name());
                    Vec::new()
                }
                Err(_) => Vec::new(),
            };

            if in_flight.get(&key).is_some_and(|current| current.id == flight.id) {
                in_flight.remove(&key);
            }
            removed
        };
        self.store.finish_removals(removed);

        self.store.counters().record_load(outcome.is_ok());
        if let Err(error) = &outcome {
            warn!("{}", error);
        }

        flight.outcome.send_replace(Some(outcome));
    }

    /// Whether nothing invalidated the load's result while it ran; called
    /// with the in-flight lock held
    fn still_wanted(&self, key: &K, flight: &InFlight<K, V>, value: &V) -> bool {
        !flight.superseded.load(Ordering::SeqCst)
            && flight.generation == self.shared.generation.load(Ordering::SeqCst)
            && !flight
                .discard_if
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|predicate| predicate(key, value))
    }

    async fn wait(&self, mut receiver: watch::Receiver<Outcome<V>>) -> Result<V> {
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(CacheError::load_failed(self.name(), Box::new(LoadAbandoned))))
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlightMap<K, V>> {
        self.shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LoadingNamedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingNamedCache")
            .field("store", &self.store)
            .finish()
    }
}
