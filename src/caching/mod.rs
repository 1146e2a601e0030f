//! # Response Caching Module
//!
//! Caches relayed upstream responses so repeated catalog queries do not reach
//! the upstream API or the allow-list logic again.
//!
//! ## Architecture
//! 1. **Key Generator**: namespaced hash of the full request URI
//! 2. **TTL Resolver**: disabled paths, header override, per-path TTL, defaults
//! 3. **Middleware**: read before the handler, conditional write after it
//! 4. **Stores**: Redis (four topologies) or in-memory, behind one enum
//!
//! Store failures never fail a request. A failed read is treated as a miss
//! and a failed write is logged and dropped.

pub mod key_generator;
pub mod middleware;
pub mod stores;
pub mod ttl;

pub use key_generator::{derive_key, ResponseKeyGenerator};
pub use middleware::{cache_middleware, CacheLayerState};
pub use stores::{CacheEntry, CacheProvider, RedisNode, RedisTopology, WriteOutcome};
pub use ttl::{ResponseOutcome, TtlDecision, TtlResolver, TTL_HEADER};

use crate::core::error::GatewayError;

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache configuration error: {message}")]
    Configuration { message: String },
}

impl From<CacheError> for GatewayError {
    fn from(err: CacheError) -> Self {
        GatewayError::Cache {
            message: err.to_string(),
        }
    }
}
