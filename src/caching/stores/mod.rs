//! # Cache Stores Module
//!
//! Cache backends behind a single get / set-if-absent contract.
//!
//! [`CacheProvider`] is a closed enum: the Redis deployment (one of four
//! topologies, see [`RedisTopology`]) or an in-process map used for tests and
//! local runs. The backend is chosen once at startup and the rest of the relay
//! never looks at which one it got.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::{RedisNode, RedisStore, RedisTopology};

use super::{CacheError, CacheResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::time::Duration;

/// Snapshot of a completed response
///
/// Stored as `{"statusCode": <int>, "response": <raw JSON body>}`. The body
/// must be a JSON document; it is embedded as-is, not re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status_code: u16,
    pub body: Bytes,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    status_code: u16,
    #[serde(borrow)]
    response: &'a RawValue,
}

impl CacheEntry {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// Encode into the stored wire format
    pub fn encode(&self) -> CacheResult<Vec<u8>> {
        let response: &RawValue = serde_json::from_slice(&self.body)?;
        let wire = WireEntry {
            status_code: self.status_code,
            response,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decode a stored value
    pub fn decode(raw: &[u8]) -> CacheResult<Self> {
        let wire: WireEntry<'_> = serde_json::from_slice(raw)?;
        Ok(Self {
            status_code: wire.status_code,
            body: Bytes::copy_from_slice(wire.response.get().as_bytes()),
        })
    }
}

/// Result of a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No live entry existed; ours is now stored
    Stored,
    /// Another writer got there first; nothing was changed
    AlreadyPresent,
}

/// The cache backend selected at startup
pub enum CacheProvider {
    Redis(RedisStore),
    Memory(InMemoryStore),
}

impl CacheProvider {
    /// Connect to the configured Redis deployment
    pub async fn connect(topology: &RedisTopology) -> CacheResult<Self> {
        Ok(Self::Redis(RedisStore::connect(topology).await?))
    }

    /// In-process backend
    pub fn in_memory() -> Self {
        Self::Memory(InMemoryStore::new())
    }

    /// Backend name for logs
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(store) => store.topology_name(),
            Self::Memory(_) => "memory",
        }
    }

    /// Look up an entry. `Ok(None)` is a miss.
    ///
    /// A stored value that cannot be decoded is reported as an error so the
    /// caller treats it like any other store failure.
    pub async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let raw = match self {
            Self::Redis(store) => store.get(key).await?,
            Self::Memory(store) => store.get(key),
        };

        raw.map(|bytes| CacheEntry::decode(&bytes)).transpose()
    }

    /// Store `entry` under `key` for `ttl` unless a live entry already exists
    pub async fn set_if_absent(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> CacheResult<WriteOutcome> {
        if ttl.is_zero() {
            return Err(CacheError::Store {
                message: format!("refusing to store {} with a zero ttl", key),
            });
        }

        let value = entry.encode()?;
        match self {
            Self::Redis(store) => store.set_if_absent(key, &value, ttl).await,
            Self::Memory(store) => Ok(store.set_if_absent(key, &value, ttl)),
        }
    }
}
