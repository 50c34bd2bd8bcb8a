//! # Stroom Cache (stroom-cache)
//!
//! Named cache manager with load collapsing, eviction and cluster-wide clearing.
//!
//! ## Features
//!
//! - Named, individually configured caches owned by one [`CacheManager`]
//! - Least recently used size bound, expire-after-write and expire-after-access
//! - Configuration read through a live supplier, applied on rebuild
//! - Loading caches running at most one loader per key at a time
//! - Removal notifications carrying the removal cause
//! - Event-driven invalidation (logout, entity changed)
//! - "Clear on all nodes" scatter-gather with per-node results
//!
//! ## Plain Cache
//!
//! ```
//! use stroom_cache::{fixed, CacheConfig, CacheManager, NamedCache};
//!
//! # fn main() -> stroom_cache::Result<()> {
//! let manager = CacheManager::new();
//! let cache: NamedCache<String, String> = manager.create(
//!     "feed-lookup",
//!     fixed(CacheConfig::builder().maximum_size(2).build()),
//!     None,
//! )?;
//!
//! cache.put("A".to_string(), "1".to_string());
//! cache.put("B".to_string(), "2".to_string());
//! cache.put("C".to_string(), "3".to_string());
//!
//! assert_eq!(cache.get("A"), None);
//! assert_eq!(cache.size(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Loading Cache
//!
//! ```
//! use stroom_cache::{fixed, loader_fn, BoxError, CacheConfig, CacheManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = CacheManager::new();
//!     let upper = manager.create_loading(
//!         "upper",
//!         fixed(CacheConfig::unbounded()),
//!         loader_fn(|key: String| async move { Ok::<_, BoxError>(key.to_uppercase()) }),
//!         None,
//!     )?;
//!
//!     assert_eq!(upper.get("x").await?, "X");
//!     Ok(())
//! }
//! ```
//!
//! ## Cluster Clear
//!
//! ```no_run
//! use std::sync::Arc;
//! use stroom_cache::cluster::{ClusterCacheClearer, LocalNodeClient, NodeInfo, StaticNodeDirectory};
//! use stroom_cache::CacheManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = Arc::new(CacheManager::new());
//!     let clearer = ClusterCacheClearer::new(
//!         Arc::new(StaticNodeDirectory::new(vec![NodeInfo::new("node1", "local")])),
//!         Arc::new(LocalNodeClient::new().with_node("node1", manager)),
//!     );
//!
//!     let report = clearer.clear_on_all_nodes(Some("feed-lookup")).await?;
//!     println!("Failed nodes: {:?}", report.failed());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cluster;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    fixed, loader_fn, CacheConfig, CacheConfigBuilder, CacheEvent, CacheEventHandler, CacheInfo,
    CacheManager, CacheName, CacheStats, ClearFn, Clearable, ConfigSupplier, EntityAction,
    EventBus, InvalidateOnEntityChange, InvalidateOnLogout, Loader, LoadingNamedCache,
    ManagedCache, NamedCache, RemovalCause, RemovalListener, RemovalNotification,
};
pub use cluster::{
    ClusterCacheClearer, ClusterClearReport, NodeClearOutcome, NodeClient, NodeDirectory, NodeInfo,
};
pub use error::{BoxError, CacheError, Result};
