//! API routes for the cache admin node

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use stroom_cache::cluster::{ClusterCacheClearer, ClusterClearReport, NodeDirectory, NodeInfo};
use stroom_cache::{CacheError, CacheInfo, CacheManager};
use thiserror::Error;
use tracing::{debug, error, info};

use super::middleware::Caller;
use crate::client::{HttpNodeClient, NodeStatusError};

/// Application state
pub struct AppState {
    pub node_name: String,
    pub manager: Arc<CacheManager>,
    pub clearer: Arc<ClusterCacheClearer>,
    pub directory: Arc<dyn NodeDirectory>,
    pub peers: Arc<HttpNodeClient>,
}

/// `?node=<name>` targets another cluster member; absent means this node
#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    pub node: Option<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node: String,
    pub caches: usize,
}

/// Result of a local clear
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub node: String,
    pub cleared: u64,
}

/// Body of a cluster clear request; no name clears every cache
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClusterClearRequest {
    pub name: Option<String>,
}

/// Errors returned to API clients as `{"error": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::CacheNotFound(_) => ApiError::NotFound(error.to_string()),
            CacheError::ManagerClosed => ApiError::Unavailable(error.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(message) => {
                error!("Forwarded request failed: {}", message);
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(message) => {
                error!("Request failed: {}", message);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl ApiError {
    /// A member's 404 stays a 404; anything else it failed with is a 502
    fn forwarded(error: anyhow::Error) -> Self {
        match error.downcast_ref::<NodeStatusError>() {
            Some(status) if status.status == StatusCode::NOT_FOUND.as_u16() => {
                ApiError::NotFound(status.message.clone())
            }
            _ => ApiError::BadGateway(format!("{:#}", error)),
        }
    }
}

impl AppState {
    /// The member a request should be forwarded to, or `None` to answer locally
    async fn forward_target(&self, query: &NodeQuery) -> Result<Option<NodeInfo>, ApiError> {
        let Some(name) = query.node.as_deref() else {
            return Ok(None);
        };
        if name == self.node_name {
            return Ok(None);
        }

        let target = self
            .directory
            .nodes()
            .await?
            .into_iter()
            .find(|node| node.name == name)
            .ok_or_else(|| ApiError::NotFound(format!("Node not found: {}", name)))?;
        debug!("Forwarding request to node '{}'", target.name);
        Ok(Some(target))
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: if state.manager.is_closed() { "closed" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node: state.node_name.clone(),
        caches: state.manager.len(),
    })
}

/// Every cache on the targeted node, sorted by name
pub async fn list_caches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NodeQuery>,
) -> Result<Json<Vec<CacheInfo>>, ApiError> {
    if let Some(target) = state.forward_target(&query).await? {
        let caches = state
            .peers
            .list_caches(&target, None)
            .await
            .map_err(ApiError::forwarded)?;
        return Ok(Json(caches));
    }
    Ok(Json(state.manager.list_caches()?))
}

/// One cache on the targeted node
pub async fn get_cache(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<NodeQuery>,
) -> Result<Json<CacheInfo>, ApiError> {
    if let Some(target) = state.forward_target(&query).await? {
        let info = state
            .peers
            .cache_info(&target, &name, None)
            .await
            .map_err(ApiError::forwarded)?;
        return Ok(Json(info));
    }
    Ok(Json(state.manager.cache_info(&name)?))
}

/// Clear one cache on the targeted node
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
    Query(query): Query<NodeQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    if let Some(target) = state.forward_target(&query).await? {
        info!(
            "Clear of cache '{}' on node '{}' requested by {}",
            name, target.name, caller.0
        );
        let cleared = state
            .peers
            .clear(&target, Some(&name), None)
            .await
            .map_err(ApiError::forwarded)?;
        return Ok(Json(ClearResponse {
            node: target.name,
            cleared,
        }));
    }

    info!("Clear of cache '{}' requested by {}", name, caller.0);
    state.manager.clear_cache(&name)?;
    Ok(Json(ClearResponse {
        node: state.node_name.clone(),
        cleared: 1,
    }))
}

/// Clear every cache on the targeted node
pub async fn clear_all(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<NodeQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    if let Some(target) = state.forward_target(&query).await? {
        info!(
            "Clear of all caches on node '{}' requested by {}",
            target.name, caller.0
        );
        let cleared = state
            .peers
            .clear(&target, None, None)
            .await
            .map_err(ApiError::forwarded)?;
        return Ok(Json(ClearResponse {
            node: target.name,
            cleared,
        }));
    }

    info!("Clear of all caches requested by {}", caller.0);
    let cleared = state.manager.clear_all()?;
    Ok(Json(ClearResponse {
        node: state.node_name.clone(),
        cleared: cleared as u64,
    }))
}

/// Clear one or all caches on every node of the cluster
pub async fn cluster_clear(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<ClusterClearRequest>,
) -> Result<Json<ClusterClearReport>, ApiError> {
    info!(
        "Cluster clear of {} requested by {}",
        request.name.as_deref().unwrap_or("all caches"),
        caller.0
    );
    let report = state
        .clearer
        .clear_on_all_nodes(request.name.as_deref())
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let response = ApiError::from(CacheError::CacheNotFound("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(CacheError::ManagerClosed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response =
            ApiError::from(CacheError::DirectoryError("down".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_forwarded_errors_keep_not_found() {
        let missing = anyhow::Error::new(NodeStatusError {
            node: "node2".to_string(),
            status: 404,
            message: "Cache not found: feed-lookup".to_string(),
        });
        let response = ApiError::forwarded(missing).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let refused = anyhow::anyhow!("Failed to reach node 'node2'");
        let response = ApiError::forwarded(refused).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
