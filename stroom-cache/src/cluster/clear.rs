//! Scatter-gather "clear on all nodes"

use crate::cluster::node::{NodeClient, NodeDirectory, NodeInfo};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Default time a single node may take to answer
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum NodeClearOutcome {
    /// The node cleared this many caches
    Cleared { caches: u64 },

    /// The node could not be reached, timed out or reported an error
    Failed { error: String },
}

impl NodeClearOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeClearOutcome::Cleared { .. })
    }
}

/// Per-node results of one cluster clear
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClearReport {
    pub request_id: Uuid,

    /// Cache that was cleared; `None` means every cache
    pub cache_name: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Outcome keyed by node name
    pub results: BTreeMap<String, NodeClearOutcome>,
}

impl ClusterClearReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(node, _)| node.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(node, _)| node.as_str())
            .collect()
    }

    pub fn is_complete_success(&self) -> bool {
        self.results.values().all(NodeClearOutcome::is_success)
    }
}

/// Fans a clear request out to every node known to the directory
///
/// Nodes are contacted concurrently, each bounded by its own timeout. A node
/// failing never stops the others; failures are reported per node.
pub struct ClusterCacheClearer {
    directory: Arc<dyn NodeDirectory>,
    client: Arc<dyn NodeClient>,
    node_timeout: Duration,
}

impl ClusterCacheClearer {
    pub fn new(directory: Arc<dyn NodeDirectory>, client: Arc<dyn NodeClient>) -> Self {
        Self {
            directory,
            client,
            node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    /// Clear one cache, or all caches when `cache_name` is `None`, on every node
    ///
    /// Only a failure to list the nodes, or a listing that names the same
    /// node twice, is an error.
    pub async fn clear_on_all_nodes(&self, cache_name: Option<&str>) -> Result<ClusterClearReport> {
        let nodes = self.directory.nodes().await?;
        reject_duplicate_names(&nodes)?;
        let request_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            "Cluster clear {} of {} on {} nodes",
            request_id,
            cache_name.unwrap_or("all caches"),
            nodes.len()
        );

        let results = join_all(nodes.iter().map(|node| self.clear_node(node, cache_name))).await;

        let report = ClusterClearReport {
            request_id,
            cache_name: cache_name.map(str::to_string),
            started_at,
            results: nodes
                .into_iter()
                .map(|node| node.name)
                .zip(results)
                .collect(),
        };

        if report.is_complete_success() {
            info!("Cluster clear {} succeeded on all nodes", request_id);
        } else {
            warn!(
                "Cluster clear {} failed on nodes: {}",
                request_id,
                report.failed().join(", ")
            );
        }

        Ok(report)
    }

    async fn clear_node(&self, node: &NodeInfo, cache_name: Option<&str>) -> NodeClearOutcome {
        let result = tokio::time::timeout(self.node_timeout, self.client.clear_caches(node, cache_name))
            .await
            .unwrap_or_else(|_| {
                Err(CacheError::UnreachableNode {
                    node: node.name.clone(),
                    message: format!("no response within {:?}", self.node_timeout),
                })
            });

        match result {
            Ok(caches) => NodeClearOutcome::Cleared { caches },
            Err(e) => {
                warn!("Failed to clear caches on node '{}': {}", node.name, e);
                NodeClearOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Reports are keyed by node name, so every listed node needs its own
fn reject_duplicate_names(nodes: &[NodeInfo]) -> Result<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node.name.as_str()) {
            return Err(CacheError::DirectoryError(format!(
                "node '{}' is listed more than once",
                node.name
            )));
        }
    }
    Ok(())
}
