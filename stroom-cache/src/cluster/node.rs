//! Cluster membership and per-node clear clients

use crate::cache::CacheManager;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A cluster member as known to the node directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Unique node name, used as the key of clear reports
    pub name: String,

    /// Base URL of the node's admin API, e.g. `http://node1:8080`
    pub base_url: String,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

/// Source of the current cluster membership
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    async fn nodes(&self) -> Result<Vec<NodeInfo>>;
}

/// Fixed membership list
#[derive(Debug, Clone, Default)]
pub struct StaticNodeDirectory {
    nodes: Vec<NodeInfo>,
}

impl StaticNodeDirectory {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.nodes.clone())
    }
}

/// Asks one node to clear its caches
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Clear `cache_name` on `node`, or every cache when `None`
    ///
    /// Returns the number of caches the node cleared.
    async fn clear_caches(&self, node: &NodeInfo, cache_name: Option<&str>) -> Result<u64>;
}

/// Clears managers living in this process, addressed by node name
#[derive(Default)]
pub struct LocalNodeClient {
    managers: HashMap<String, Arc<CacheManager>>,
}

impl LocalNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, name: impl Into<String>, manager: Arc<CacheManager>) -> Self {
        self.managers.insert(name.into(), manager);
        self
    }
}

#[async_trait]
impl NodeClient for LocalNodeClient {
    async fn clear_caches(&self, node: &NodeInfo, cache_name: Option<&str>) -> Result<u64> {
        let manager = self
            .managers
            .get(&node.name)
            .ok_or_else(|| CacheError::UnreachableNode {
                node: node.name.clone(),
                message: "no local manager for node".to_string(),
            })?;

        debug!("Clearing caches on local node '{}'", node.name);
        manager.clear_matching(cache_name)
    }
}
