//! # Cache Key Generator
//!
//! Keys are `<namespace>:<sha256(request uri)>`. The URI is hashed exactly as
//! received (path plus raw query string), so reordering query parameters
//! yields a different key.

use sha2::{Digest, Sha256};

/// Derive the cache key for a request URI under `namespace`
pub fn derive_key(namespace: &str, request_uri: &str) -> String {
    let digest = Sha256::digest(request_uri.as_bytes());
    format!("{}:{}", namespace, hex::encode(digest))
}

/// Key generator bound to one application namespace
#[derive(Debug, Clone)]
pub struct ResponseKeyGenerator {
    namespace: String,
}

impl ResponseKeyGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn generate_key(&self, request_uri: &str) -> String {
        derive_key(&self.namespace, request_uri)
    }
}
