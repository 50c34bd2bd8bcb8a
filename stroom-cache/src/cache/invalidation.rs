//! Cache invalidation: removal notifications and event-driven invalidation
//!
//! Two mechanisms live here:
//! - Removal notifications: every entry that leaves a cache, for any reason,
//!   is reported once to the cache's removal listener together with its cause.
//! - Event-based invalidation: domain lifecycle events (logout, entity changed)
//!   are published on a process-local [`EventBus`]; subscribed handlers narrow
//!   them down to single-key invalidations or selective clears.

use crate::cache::loading::LoadingNamedCache;
use crate::cache::store::NamedCache;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

/// Why an entry left a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalCause {
    /// Removed by `invalidate`, `remove` or a selective invalidation
    Explicit,

    /// Removed because the whole cache was cleared
    Cleared,

    /// Expired after write or after access
    Expired,

    /// Evicted because the cache exceeded its maximum size
    Size,
}

impl RemovalCause {
    /// True when the eviction policy, rather than a caller, removed the entry
    pub fn was_evicted(&self) -> bool {
        matches!(self, RemovalCause::Expired | RemovalCause::Size)
    }
}

impl std::fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalCause::Explicit => write!(f, "explicit"),
            RemovalCause::Cleared => write!(f, "clear-all"),
            RemovalCause::Expired => write!(f, "expired"),
            RemovalCause::Size => write!(f, "size"),
        }
    }
}

/// An entry that has left a cache
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalNotification<K, V> {
    pub key: K,
    pub value: V,
    pub cause: RemovalCause,
}

/// Callback invoked synchronously, on the removing thread, for every removal
pub type RemovalListener<K, V> = Arc<dyn Fn(RemovalNotification<K, V>) + Send + Sync>;

/// Run a callback, logging instead of propagating a panic
pub(crate) fn run_guarded<F: FnOnce()>(context: &str, callback: F) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            error!("{} panicked: {}", context, panic_message(&*panic));
            false
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityAction {
    Create,
    Update,
    Delete,
    /// Every entity of the type is affected
    Clear,
}

/// Domain lifecycle event relevant to cached state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CacheEvent {
    /// A user logged out; identity-scoped entries should go
    Logout { user_id: String },

    /// An entity changed; caches keyed by it drop just that key
    EntityChanged {
        entity_type: String,
        entity_id: Option<String>,
        action: EntityAction,
    },
}

impl CacheEvent {
    pub fn logout(user_id: impl Into<String>) -> Self {
        CacheEvent::Logout {
            user_id: user_id.into(),
        }
    }

    pub fn entity_changed(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        action: EntityAction,
    ) -> Self {
        CacheEvent::EntityChanged {
            entity_type: entity_type.into(),
            entity_id: Some(entity_id.into()),
            action,
        }
    }

    /// Every entity of the given type changed
    pub fn entity_type_cleared(entity_type: impl Into<String>) -> Self {
        CacheEvent::EntityChanged {
            entity_type: entity_type.into(),
            entity_id: None,
            action: EntityAction::Clear,
        }
    }
}

/// Subscriber to cache events
pub trait CacheEventHandler: Send + Sync {
    fn on_event(&self, event: &CacheEvent);
}

/// Process-local, synchronous event bus
///
/// Handlers run on the publishing thread in subscription order. A panicking
/// handler is logged and skipped; the remaining handlers still run.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn CacheEventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for all subsequent events
    pub fn subscribe(&self, handler: Arc<dyn CacheEventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Deliver an event to every handler, returning how many ran cleanly
    pub fn publish(&self, event: &CacheEvent) -> usize {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!("Publishing {:?} to {} handlers", event, handlers.len());

        handlers
            .iter()
            .filter(|handler| run_guarded("Cache event handler", || handler.on_event(event)))
            .count()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Selects the keys an event handler invalidates
pub type KeyPredicate<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// A cache that event handlers can invalidate
pub trait InvalidationTarget<K>: Send + Sync {
    fn invalidate_key(&self, key: &K);

    fn invalidate_where(&self, predicate: KeyPredicate<K>) -> usize;

    fn clear_all(&self);
}

impl<K, V> InvalidationTarget<K> for NamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate_key(&self, key: &K) {
        self.invalidate(key);
    }

    fn invalidate_where(&self, predicate: KeyPredicate<K>) -> usize {
        self.invalidate_entries(move |key, _| predicate(key))
    }

    fn clear_all(&self) {
        self.clear();
    }
}

impl<K, V> InvalidationTarget<K> for LoadingNamedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn invalidate_key(&self, key: &K) {
        self.invalidate(key);
    }

    fn invalidate_where(&self, predicate: KeyPredicate<K>) -> usize {
        self.invalidate_entries(move |key, _| predicate(key))
    }

    fn clear_all(&self) {
        self.clear();
    }
}

/// Invalidates one key when an entity of the watched type changes
///
/// `key_for` maps the entity id to the cache key; returning `None` ignores
/// the event. An [`EntityAction::Clear`] event clears the whole cache.
pub struct InvalidateOnEntityChange<K, T> {
    entity_type: String,
    target: T,
    key_for: Box<dyn Fn(&str) -> Option<K> + Send + Sync>,
}

impl<K, T: InvalidationTarget<K>> InvalidateOnEntityChange<K, T> {
    pub fn new(
        entity_type: impl Into<String>,
        target: T,
        key_for: impl Fn(&str) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            target,
            key_for: Box::new(key_for),
        }
    }
}

impl<K: Send + Sync, T: InvalidationTarget<K>> CacheEventHandler for InvalidateOnEntityChange<K, T> {
    fn on_event(&self, event: &CacheEvent) {
        let CacheEvent::EntityChanged {
            entity_type,
            entity_id,
            action,
        } = event
        else {
            return;
        };

        if entity_type != &self.entity_type {
            return;
        }

        match (action, entity_id) {
            (EntityAction::Clear, _) | (_, None) => {
                debug!("Clearing cache for {} change", entity_type);
                self.target.clear_all();
            }
            (_, Some(id)) => {
                if let Some(key) = (self.key_for)(id.as_str()) {
                    debug!("Invalidating {} {} after {:?}", entity_type, id, action);
                    self.target.invalidate_key(&key);
                }
            }
        }
    }
}

/// Drops every entry belonging to a user when that user logs out
pub struct InvalidateOnLogout<K, T> {
    target: T,
    belongs_to: Arc<dyn Fn(&K, &str) -> bool + Send + Sync>,
}

impl<K, T: InvalidationTarget<K>> InvalidateOnLogout<K, T> {
    pub fn new(target: T, belongs_to: impl Fn(&K, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            target,
            belongs_to: Arc::new(belongs_to),
        }
    }
}

impl<K: Send + Sync + 'static, T: InvalidationTarget<K>> CacheEventHandler
    for InvalidateOnLogout<K, T>
{
    fn on_event(&self, event: &CacheEvent) {
        if let CacheEvent::Logout { user_id } = event {
            let belongs_to = Arc::clone(&self.belongs_to);
            let user = user_id.clone();
            let removed = self
                .target
                .invalidate_where(Arc::new(move |key: &K| belongs_to(key, &user)));
            debug!("Logout of {} invalidated {} entries", user_id, removed);
        }
    }
}
