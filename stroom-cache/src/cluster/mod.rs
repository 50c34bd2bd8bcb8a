//! Cluster-wide cache clearing
//!
//! Each node owns its own [`CacheManager`](crate::cache::CacheManager); there
//! is no shared cache. Clearing "on all nodes" asks every member listed by a
//! [`NodeDirectory`] to clear locally and gathers a per-node report.

pub mod clear;
pub mod node;

pub use clear::{ClusterCacheClearer, ClusterClearReport, NodeClearOutcome, DEFAULT_NODE_TIMEOUT};
pub use node::{LocalNodeClient, NodeClient, NodeDirectory, NodeInfo, StaticNodeDirectory};
