//! API server for the cache admin node

use anyhow::Result;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::middleware::{auth_middleware, AuthState};
use super::routes::{clear_all, clear_cache, cluster_clear, get_cache, health_check, list_caches, AppState};

/// API server
pub struct ApiServer {
    state: Arc<AppState>,
    auth: AuthState,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>, jwt_secret: &str) -> Self {
        Self {
            state,
            auth: AuthState::new(jwt_secret),
        }
    }

    /// Public health route plus the authenticated `/api` routes
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/caches", get(list_caches).delete(clear_all))
            .route("/caches/:name", get(get_cache).delete(clear_cache))
            .route("/cluster/clear", post(cluster_clear))
            .route_layer(from_fn_with_state(self.auth.clone(), auth_middleware));

        Router::new()
            .route("/health", get(health_check))
            .nest("/api", api)
            .with_state(Arc::clone(&self.state))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        info!("Starting API server on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("API server stopped");
        Ok(())
    }
}
