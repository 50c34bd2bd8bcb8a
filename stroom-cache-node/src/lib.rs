//! # Stroom Cache Node (stroom-cache-node)
//!
//! HTTP admin node hosting a [`CacheManager`](stroom_cache::CacheManager):
//! cache listing, local clearing and cluster-wide clearing across peers.

pub mod api;
pub mod client;
pub mod config;
pub mod node;

pub use api::{ApiServer, AuthState, JwtAuth};
pub use client::HttpNodeClient;
pub use config::{ConfigStore, NodeConfig};
pub use node::{CacheNode, DeclaredCache};
