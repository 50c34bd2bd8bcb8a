//! Error types for cache operations
//!
//! This module defines the error taxonomy shared by the cache engine, the
//! cache manager registry and the cluster clear protocol.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by loader functions
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Loader error shared between every caller waiting on the same load
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Main error type for cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Invalid cache configuration, e.g. a zero maximum size
    #[error("Configuration error for cache '{cache}': {message}")]
    ConfigurationError { cache: String, message: String },

    /// Cache name is empty or otherwise unusable
    #[error("Invalid cache name: '{0}'")]
    InvalidName(String),

    /// A cache with this name exists with a different configuration or type
    #[error("Cache '{name}' is already registered: {reason}")]
    DuplicateRegistration { name: String, reason: String },

    /// No cache registered under this name
    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    /// The loader failed; the source is the loader's own error
    #[error("Failed to load value for cache '{cache}': {source}")]
    LoadFailed {
        cache: String,
        #[source]
        source: SharedError,
    },

    /// A caller stopped waiting for an in-flight load
    #[error("Gave up waiting for load in cache '{cache}' after {timeout:?}")]
    LoadTimeout { cache: String, timeout: Duration },

    /// A cluster member could not be reached or failed to clear
    #[error("Node '{node}' unreachable: {message}")]
    UnreachableNode { node: String, message: String },

    /// Node directory could not list cluster members
    #[error("Node directory error: {0}")]
    DirectoryError(String),

    /// Operation attempted after the cache manager was closed
    #[error("Cache manager is closed")]
    ManagerClosed,
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Wrap a loader error for the named cache
    pub fn load_failed(cache: impl Into<String>, source: BoxError) -> Self {
        CacheError::LoadFailed {
            cache: cache.into(),
            source: Arc::from(source),
        }
    }

    /// The loader's own error, if this is a load failure
    ///
    /// Callers downcast this to recover the underlying domain error.
    pub fn load_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            CacheError::LoadFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// True when the error means the named cache does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::CacheNotFound(_))
    }
}
