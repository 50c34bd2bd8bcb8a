//! HTTP admin API for a cache node

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;

pub use auth::JwtAuth;
pub use middleware::{AuthState, Caller};
pub use routes::{AppState, ClearResponse, ClusterClearRequest};
pub use server::ApiServer;
