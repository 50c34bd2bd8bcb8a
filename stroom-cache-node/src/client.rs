//! HTTP client for talking to cache nodes
//!
//! Used by the cluster clearer to reach peers and by the CLI to reach a node.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use stroom_cache::cluster::{ClusterClearReport, NodeClient, NodeInfo};
use stroom_cache::{CacheError, CacheInfo};
use thiserror::Error;
use tracing::debug;

use crate::api::{ClearResponse, ClusterClearRequest, JwtAuth};

/// A node answered with a non-success status
#[derive(Debug, Error)]
#[error("Node '{node}' returned {status}: {message}")]
pub struct NodeStatusError {
    pub node: String,
    pub status: u16,
    pub message: String,
}

/// Calls a node's admin API with a token minted from the shared secret
pub struct HttpNodeClient {
    http: Client,
    auth: Arc<JwtAuth>,
    subject: String,
}

impl HttpNodeClient {
    /// `subject` identifies the caller in the receiving node's logs
    pub fn new(jwt_secret: &str, subject: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            auth: Arc::new(JwtAuth::new(jwt_secret)),
            subject: subject.into(),
        })
    }

    /// Client a node uses to reach its peers
    pub fn for_node(jwt_secret: &str, node_name: &str, timeout: Duration) -> Result<Self> {
        Self::new(jwt_secret, format!("node:{}", node_name), timeout)
    }

    /// Caches of `node`, or of the cluster member `member` as seen through `node`
    pub async fn list_caches(&self, node: &NodeInfo, member: Option<&str>) -> Result<Vec<CacheInfo>> {
        let url = for_member(endpoint(node, &["api", "caches"])?, member);
        self.send(node, self.http.get(url)).await
    }

    pub async fn cache_info(
        &self,
        node: &NodeInfo,
        cache_name: &str,
        member: Option<&str>,
    ) -> Result<CacheInfo> {
        let url = for_member(endpoint(node, &["api", "caches", cache_name])?, member);
        self.send(node, self.http.get(url)).await
    }

    /// Clear one cache, or all when `cache_name` is `None`, on a single node
    ///
    /// That node is `node` itself unless `member` names another member for
    /// `node` to forward to.
    pub async fn clear(
        &self,
        node: &NodeInfo,
        cache_name: Option<&str>,
        member: Option<&str>,
    ) -> Result<u64> {
        let url = match cache_name {
            Some(name) => endpoint(node, &["api", "caches", name])?,
            None => endpoint(node, &["api", "caches"])?,
        };
        let response: ClearResponse = self
            .send(node, self.http.delete(for_member(url, member)))
            .await?;
        Ok(response.cleared)
    }

    /// Ask `node` to clear on every node of its cluster
    pub async fn cluster_clear(
        &self,
        node: &NodeInfo,
        cache_name: Option<&str>,
    ) -> Result<ClusterClearReport> {
        let url = endpoint(node, &["api", "cluster", "clear"])?;
        let body = ClusterClearRequest {
            name: cache_name.map(str::to_string),
        };
        self.send(node, self.http.post(url).json(&body)).await
    }

    async fn send<T: DeserializeOwned>(&self, node: &NodeInfo, request: RequestBuilder) -> Result<T> {
        let token = self.auth.request_token(&self.subject)?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to reach node '{}' at {}", node.name, node.base_url))?;

        let response = check_status(node, response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Invalid response from node '{}'", node.name))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn clear_caches(&self, node: &NodeInfo, cache_name: Option<&str>) -> stroom_cache::Result<u64> {
        debug!("Sending clear request to node '{}'", node.name);
        self.clear(node, cache_name, None)
            .await
            .map_err(|e| CacheError::UnreachableNode {
                node: node.name.clone(),
                message: format!("{:#}", e),
            })
    }
}

/// Build `<base_url>/<segments...>`, percent-encoding each segment
fn endpoint(node: &NodeInfo, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(&node.base_url)
        .with_context(|| format!("Invalid base URL for node '{}': {}", node.name, node.base_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Base URL for node '{}' cannot have a path", node.name))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn for_member(mut url: Url, member: Option<&str>) -> Url {
    if let Some(member) = member {
        url.query_pairs_mut().append_pair("node", member);
    }
    url
}

async fn check_status(node: &NodeInfo, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    Err(NodeStatusError {
        node: node.name.clone(),
        status: status.as_u16(),
        message,
    }
    .into())
}
