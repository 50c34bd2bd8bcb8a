//! Node configuration
//!
//! A node reads one YAML file declaring its identity, its peers and the caches
//! it hosts:
//!
//! ```yaml
//! nodeName: node1
//! port: 8080
//! peers:
//!   - name: node2
//!     baseUrl: http://node2:8080
//! caches:
//!   feed-lookup:
//!     maximumSize: 1000
//!     expireAfterWrite: 10m
//! ```
//!
//! The file is re-read periodically by [`ConfigStore::reload`]; cache
//! configuration suppliers read through the store, so new limits reach the
//! caches on their next rebuild.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use stroom_cache::cache::config::serde_duration;
use stroom_cache::cluster::{NodeDirectory, NodeInfo};
use stroom_cache::{CacheConfig, ConfigSupplier};
use tracing::{info, warn};

pub const DEFAULT_JWT_SECRET: &str = "default_secret_change_in_production";

/// Everything a node needs to start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,

    /// Unique name of this node within the cluster
    pub node_name: String,

    /// Shared HS256 secret; every node of a cluster must use the same one
    pub jwt_secret: String,

    /// Other cluster members; this node is added automatically
    pub peers: Vec<NodeInfo>,

    /// How often expired entries are swept
    #[serde(with = "serde_duration")]
    pub sweep_interval: Duration,

    /// How long a cluster clear waits for one node
    #[serde(with = "serde_duration")]
    pub node_timeout: Duration,

    /// How often the file is re-read
    #[serde(with = "serde_duration")]
    pub config_reload_interval: Duration,

    /// Caches hosted by this node
    pub caches: BTreeMap<String, CacheConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            node_name: "node1".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            peers: Vec::new(),
            sweep_interval: Duration::from_secs(60),
            node_timeout: Duration::from_secs(10),
            config_reload_interval: Duration::from_secs(30),
            caches: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Parse a YAML document and apply the `JWT_SECRET` override
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut config: NodeConfig =
            serde_yaml::from_str(content).context("Failed to parse node configuration")?;

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            config.jwt_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read node configuration {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid node configuration {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            bail!("nodeName must not be empty");
        }
        if self.jwt_secret.is_empty() {
            bail!("jwtSecret must not be empty");
        }
        for (field, value) in [
            ("sweepInterval", self.sweep_interval),
            ("nodeTimeout", self.node_timeout),
            ("configReloadInterval", self.config_reload_interval),
        ] {
            if value.is_zero() {
                bail!("{} must be greater than 0", field);
            }
        }
        for (name, cache) in &self.caches {
            if let Err(message) = cache.validate() {
                bail!("cache '{}': {}", name, message);
            }
        }
        Ok(())
    }

    /// URL other nodes use to reach this one
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// All cluster members, this node included, sorted by name
    pub fn cluster_nodes(&self) -> Vec<NodeInfo> {
        let mut nodes = self.peers.clone();
        if !nodes.iter().any(|node| node.name == self.node_name) {
            nodes.push(NodeInfo::new(self.node_name.clone(), self.base_url()));
        }
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// Live node configuration, re-read from its file on demand
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<NodeConfig>,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = NodeConfig::load(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(config),
        })
    }

    /// A store with no backing file; `reload` keeps the given configuration
    pub fn fixed(config: NodeConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
        }
    }

    pub fn current(&self) -> NodeConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the file, returning whether anything changed
    ///
    /// An unreadable or invalid file leaves the current configuration in force.
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let config = match NodeConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping current node configuration: {:#}", e);
                return Err(e);
            }
        };

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if *current == config {
            return Ok(false);
        }

        info!("Node configuration changed, reloaded from {:?}", path);
        *current = config;
        Ok(true)
    }

    /// Replace the configuration in memory
    pub fn update(&self, config: NodeConfig) -> Result<()> {
        config.validate()?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Supplier reading the named cache's current entry
    ///
    /// A cache no longer declared in the file falls back to unbounded.
    pub fn cache_supplier(self: &Arc<Self>, name: &str) -> ConfigSupplier {
        let store = Arc::clone(self);
        let name = name.to_string();
        Arc::new(move || {
            store
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .caches
                .get(&name)
                .cloned()
                .unwrap_or_default()
        })
    }
}

/// Cluster membership as currently configured
#[async_trait]
impl NodeDirectory for ConfigStore {
    async fn nodes(&self) -> stroom_cache::Result<Vec<NodeInfo>> {
        Ok(self.current().cluster_nodes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
host: 0.0.0.0
port: 9090
nodeName: node2
jwtSecret: cluster-secret
sweepInterval: 30s
peers:
  - name: node1
    baseUrl: http://node1:9090
caches:
  feed-lookup:
    maximumSize: 1000
    expireAfterWrite: 10m
  doc-ref: {}
"#;

    #[test]
    fn test_parse_yaml() {
        let config: NodeConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.node_name, "node2");
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.node_timeout, Duration::from_secs(10));
        assert_eq!(config.caches.len(), 2);
        assert_eq!(config.caches["feed-lookup"].maximum_size, Some(1000));
        assert_eq!(
            config.caches["feed-lookup"].expire_after_write,
            Some(Duration::from_secs(600))
        );
        assert_eq!(config.caches["doc-ref"], CacheConfig::unbounded());
    }

    #[test]
    fn test_cluster_nodes_include_self() {
        let config: NodeConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let nodes = config.cluster_nodes();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "node1");
        assert_eq!(nodes[1], NodeInfo::new("node2", "http://0.0.0.0:9090"));
    }

    #[test]
    fn test_validation() {
        let mut config = NodeConfig::default();
        assert!(config.validate().is_ok());

        config.node_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config
            .caches
            .insert("bad".to_string(), CacheConfig::builder().maximum_size(0).build());
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("bad"));
    }

    #[test]
    fn test_reload_and_supplier() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "nodeName: node1\ncaches:\n  feeds:\n    maximumSize: 10\n").unwrap();

        let store = Arc::new(ConfigStore::open(file.path()).unwrap());
        let supplier = store.cache_supplier("feeds");
        assert_eq!(supplier().maximum_size, Some(10));
        assert!(!store.reload().unwrap());

        std::fs::write(file.path(), "nodeName: node1\ncaches:\n  feeds:\n    maximumSize: 20\n")
            .unwrap();
        assert!(store.reload().unwrap());
        assert_eq!(supplier().maximum_size, Some(20));

        std::fs::write(file.path(), "nodeName: [not valid").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(supplier().maximum_size, Some(20));
    }

    #[tokio::test]
    async fn test_store_as_directory() {
        let store = ConfigStore::fixed(NodeConfig::default());
        let nodes = store.nodes().await.unwrap();
        assert_eq!(nodes, vec![NodeInfo::new("node1", "http://127.0.0.1:8080")]);
    }
}
