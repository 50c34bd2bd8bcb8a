//! A running cache node: manager, declared caches, cluster clearer and API

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use stroom_cache::cluster::ClusterCacheClearer;
use stroom_cache::{CacheManager, NamedCache};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{AppState, ApiServer};
use crate::client::HttpNodeClient;
use crate::config::ConfigStore;

/// Caches declared in configuration hold JSON values keyed by string
pub type DeclaredCache = NamedCache<String, serde_json::Value>;

pub struct CacheNode {
    store: Arc<ConfigStore>,
    manager: Arc<CacheManager>,
    clearer: Arc<ClusterCacheClearer>,
    peers: Arc<HttpNodeClient>,
}

impl CacheNode {
    /// Register every declared cache and wire the cluster clearer
    pub fn build(store: Arc<ConfigStore>) -> Result<Self> {
        let config = store.current();
        let manager = Arc::new(CacheManager::for_node(config.node_name.clone()));

        let peers = Arc::new(HttpNodeClient::for_node(
            &config.jwt_secret,
            &config.node_name,
            config.node_timeout,
        )?);
        let clearer = ClusterCacheClearer::new(store.clone(), peers.clone())
            .with_node_timeout(config.node_timeout);

        register_declared(&store, &manager)?;

        Ok(Self {
            store,
            manager,
            clearer: Arc::new(clearer),
            peers,
        })
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Typed handle of a cache declared in configuration
    pub fn declared_cache(&self, name: &str) -> stroom_cache::Result<DeclaredCache> {
        self.manager.cache(name)
    }

    /// Re-read configuration, apply it to live caches and register new ones
    pub fn reload(&self) -> Result<bool> {
        reload_and_apply(&self.store, &self.manager)
    }

    /// Start the expiry sweeper and the configuration reload loop
    pub fn spawn_background(&self) -> Result<JoinHandle<()>> {
        let config = self.store.current();
        self.manager.spawn_sweeper(config.sweep_interval)?;

        Ok(tokio::spawn(reload_loop(
            self.store.clone(),
            Arc::downgrade(&self.manager),
            config.config_reload_interval,
        )))
    }

    pub fn api_server(&self) -> ApiServer {
        let config = self.store.current();
        let state = Arc::new(AppState {
            node_name: config.node_name.clone(),
            manager: self.manager.clone(),
            clearer: self.clearer.clone(),
            directory: self.store.clone(),
            peers: self.peers.clone(),
        });
        ApiServer::new(state, &config.jwt_secret)
    }

    /// Serve the API until `shutdown` resolves, then close the manager
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let result = self.api_server().serve(listener, shutdown).await;
        self.manager.close();
        result
    }
}

/// Register caches declared in configuration that are not registered yet
fn register_declared(store: &Arc<ConfigStore>, manager: &CacheManager) -> Result<usize> {
    let mut registered = 0;
    for name in store.current().caches.keys() {
        if manager.find(name)?.is_some() {
            continue;
        }
        let _cache: DeclaredCache = manager
            .create(name, store.cache_supplier(name), None)
            .with_context(|| format!("Failed to register cache '{}'", name))?;
        registered += 1;
    }
    Ok(registered)
}

fn reload_and_apply(store: &Arc<ConfigStore>, manager: &CacheManager) -> Result<bool> {
    if !store.reload()? {
        return Ok(false);
    }

    let rebuilt = manager.rebuild_all()?;
    let added = register_declared(store, manager)?;
    info!(
        "Applied new configuration: {} caches rebuilt, {} added",
        rebuilt, added
    );
    Ok(true)
}

/// Holds the manager weakly so the loop ends with the node
async fn reload_loop(store: Arc<ConfigStore>, manager: Weak<CacheManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(registry) = manager.upgrade() else {
            break;
        };
        if registry.is_closed() {
            break;
        }

        if let Err(e) = reload_and_apply(&store, &registry) {
            debug!("Configuration reload skipped: {:#}", e);
        }
    }

    debug!("Configuration reload loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use stroom_cache::CacheConfig;

    fn config_with_cache(name: &str, maximum_size: u64) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.caches.insert(
            name.to_string(),
            CacheConfig::builder().maximum_size(maximum_size).build(),
        );
        config
    }

    #[test]
    fn test_build_registers_declared_caches() {
        let store = Arc::new(ConfigStore::fixed(config_with_cache("feed-lookup", 5)));
        let node = CacheNode::build(store).unwrap();

        let cache = node.declared_cache("feed-lookup").unwrap();
        cache.put("RAW".to_string(), serde_json::json!({"id": 1}));

        assert_eq!(node.manager().cache_names().unwrap(), vec!["feed-lookup"]);
        let listed = node.manager().list_caches().unwrap();
        assert_eq!(listed[0].size, 1);
        assert_eq!(listed[0].node.as_deref(), Some(node.store().current().node_name.as_str()));
    }

    #[test]
    fn test_updated_config_applies_to_live_caches() {
        let store = Arc::new(ConfigStore::fixed(config_with_cache("feed-lookup", 5)));
        let node = CacheNode::build(store.clone()).unwrap();
        let cache = node.declared_cache("feed-lookup").unwrap();
        for i in 0..5 {
            cache.put(format!("key{}", i), serde_json::Value::Null);
        }

        let mut updated = config_with_cache("feed-lookup", 2);
        updated
            .caches
            .insert("doc-ref".to_string(), CacheConfig::unbounded());
        store.update(updated).unwrap();

        assert_eq!(node.manager().rebuild_all().unwrap(), 1);
        assert_eq!(register_declared(&store, node.manager()).unwrap(), 1);
        assert_eq!(cache.size(), 2);
        assert!(node.declared_cache("doc-ref").is_ok());
    }
}
