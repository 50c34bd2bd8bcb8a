//! JWT authentication between nodes
//!
//! Every node of a cluster shares one HS256 secret. Peers and the CLI mint
//! their own short-lived tokens from it; there is no login endpoint.

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Lifetime of tokens minted for node-to-node requests
pub const NODE_TOKEN_TTL_MINUTES: i64 = 5;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: `node:<name>` for peers, `cli` for the command line
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
}

/// JWT authentication handler
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuth {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token for `subject` valid for `ttl`
    pub fn generate_token(&self, subject: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to generate token: {}", e))
    }

    /// Short-lived token for one node-to-node or CLI request
    pub fn request_token(&self, subject: &str) -> Result<String> {
        self.generate_token(subject, Duration::minutes(NODE_TOKEN_TTL_MINUTES))
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| anyhow!("Invalid token: {}", e))?;

        Ok(token_data.claims)
    }

    /// Extract token from Authorization header (Bearer token)
    pub fn extract_bearer_token(auth_header: &str) -> Result<&str> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| anyhow!("Invalid authorization header format"))?
            .trim();

        if token.is_empty() {
            return Err(anyhow!("Empty token"));
        }

        Ok(token)
    }
}
