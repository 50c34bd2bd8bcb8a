//! # Named Cache Engine
//!
//! Bounded, optionally time-expiring key-value caches identified by unique
//! names and owned by a process-wide [`CacheManager`].
//!
//! ## Features
//!
//! - **Size Bound**: least recently used eviction above `maximumSize`
//! - **Time Expiry**: expire-after-write and expire-after-access, checked lazily
//!   on access and swept periodically by the manager
//! - **Load Collapsing**: a [`LoadingNamedCache`] runs at most one loader per key
//!   at a time and shares its outcome with every waiter
//! - **Live Configuration**: caches re-read their [`ConfigSupplier`] on rebuild
//!   and listing
//! - **Removal Notification**: one callback per entry leaving a cache, with cause
//! - **Event Invalidation**: logout and entity-changed events published on an
//!   [`EventBus`] invalidate the affected entries
//!
//! ## Example
//!
//! ```rust
//! use stroom_cache::cache::{fixed, CacheConfig, CacheManager, NamedCache};
//!
//! # fn example() -> stroom_cache::Result<()> {
//! let manager = CacheManager::new();
//! let feeds: NamedCache<String, u64> = manager.create(
//!     "feed-lookup",
//!     fixed(CacheConfig::builder().maximum_size(1000).build()),
//!     None,
//! )?;
//!
//! feeds.put("RAW_EVENTS".to_string(), 42);
//! assert_eq!(feeds.get("RAW_EVENTS"), Some(42));
//!
//! manager.clear_all()?;
//! assert_eq!(feeds.size(), 0);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod config;
pub mod entry;
pub mod invalidation;
pub mod loading;
pub mod manager;
pub mod store;
pub mod types;

pub use config::{fixed, CacheConfig, CacheConfigBuilder, ConfigSupplier};
pub use entry::{CacheEntry, CacheMetadata};
pub use invalidation::{
    CacheEvent, CacheEventHandler, EntityAction, EventBus, InvalidateOnEntityChange,
    InvalidateOnLogout, InvalidationTarget, KeyPredicate, RemovalCause, RemovalListener,
    RemovalNotification,
};
pub use loading::{loader_fn, Loader, LoadingNamedCache};
pub use manager::{CacheManager, ClearFn, Clearable, ManagedCache};
pub use store::NamedCache;
pub use types::{CacheInfo, CacheName, CacheStats};
