//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::auth::JwtAuth;

/// Authentication state shared across requests
#[derive(Clone)]
pub struct AuthState {
    pub jwt_auth: Arc<JwtAuth>,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            jwt_auth: Arc::new(JwtAuth::new(secret)),
        }
    }
}

/// Authenticated subject of the current request
#[derive(Debug, Clone)]
pub struct Caller(pub String);

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = JwtAuth::extract_bearer_token(auth_header).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = state.jwt_auth.validate_token(token).map_err(|e| {
        debug!("Rejected request: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    request.extensions_mut().insert(Caller(claims.sub));

    Ok(next.run(request).await)
}
