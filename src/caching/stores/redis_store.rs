//! # Redis Cache Store
//!
//! Redis backend over the four supported deployments. The deployments differ
//! only in how connections are established and which node serves a command:
//!
//! - **single**: one connection manager to one node
//! - **cluster**: a cluster connection that routes each key to its slot owner
//! - **sentinel**: the primary is looked up through the sentinels, and looked
//!   up again when a command against it fails
//! - **replica**: writes go to the primary, reads are spread over the readers
//!
//! Every deployment stores values with `SET key value NX PX ttl`, so the first
//! writer of a key wins and later writers leave it untouched.

use super::WriteOutcome;
use crate::caching::{CacheError, CacheResult};
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisResult};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A Redis node address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisNode {
    pub host: String,
    pub port: u16,
}

impl RedisNode {
    fn connection_info(&self, password: Option<&str>) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                password: password.map(str::to_string),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for RedisNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Redis deployment the cache talks to. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum RedisTopology {
    Single {
        node: RedisNode,
        password: Option<String>,
    },
    Cluster {
        nodes: Vec<RedisNode>,
        password: Option<String>,
    },
    Sentinel {
        sentinels: Vec<RedisNode>,
        master_name: String,
        password: Option<String>,
    },
    Replica {
        writers: Vec<RedisNode>,
        readers: Vec<RedisNode>,
        password: Option<String>,
    },
}

impl RedisTopology {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::Cluster { .. } => "cluster",
            Self::Sentinel { .. } => "sentinel",
            Self::Replica { .. } => "replica",
        }
    }
}

/// Redis cache implementation
pub struct RedisStore {
    backend: RedisBackend,
}

enum RedisBackend {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
    Sentinel(SentinelBackend),
    Replica(ReplicaBackend),
}

impl RedisStore {
    /// Establish connections for the given deployment
    pub async fn connect(topology: &RedisTopology) -> CacheResult<Self> {
        let backend = match topology {
            RedisTopology::Single { node, password } => {
                let conn = connect_node(node, password.as_deref()).await?;
                info!(node = %node, "Redis cache connected (single)");
                RedisBackend::Single(conn)
            }
            RedisTopology::Cluster { nodes, password } => {
                if nodes.is_empty() {
                    return Err(CacheError::Configuration {
                        message: "cluster addresses cannot be empty".to_string(),
                    });
                }
                let infos: Vec<ConnectionInfo> = nodes
                    .iter()
                    .map(|node| node.connection_info(password.as_deref()))
                    .collect();
                let mut builder = ClusterClientBuilder::new(infos);
                if let Some(password) = password {
                    builder = builder.password(password.clone());
                }
                let conn = builder.build()?.get_async_connection().await?;
                info!(nodes = nodes.len(), "Redis cache connected (cluster)");
                RedisBackend::Cluster(conn)
            }
            RedisTopology::Sentinel {
                sentinels,
                master_name,
                password,
            } => RedisBackend::Sentinel(
                SentinelBackend::connect(sentinels.clone(), master_name.clone(), password.clone())
                    .await?,
            ),
            RedisTopology::Replica {
                writers,
                readers,
                password,
            } => RedisBackend::Replica(
                ReplicaBackend::connect(writers, readers, password.as_deref()).await?,
            ),
        };

        Ok(Self { backend })
    }

    pub fn topology_name(&self) -> &'static str {
        match &self.backend {
            RedisBackend::Single(_) => "single",
            RedisBackend::Cluster(_) => "cluster",
            RedisBackend::Sentinel(_) => "sentinel",
            RedisBackend::Replica(_) => "replica",
        }
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let value = match &self.backend {
            RedisBackend::Single(conn) => get_raw(&mut conn.clone(), key).await?,
            RedisBackend::Cluster(conn) => get_raw(&mut conn.clone(), key).await?,
            RedisBackend::Sentinel(sentinel) => {
                sentinel
                    .execute(|mut conn| async move { get_raw(&mut conn, key).await })
                    .await?
            }
            RedisBackend::Replica(replica) => get_raw(&mut replica.reader(), key).await?,
        };

        debug!(key, hit = value.is_some(), "Redis cache lookup");
        Ok(value)
    }

    pub async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<WriteOutcome> {
        let outcome = match &self.backend {
            RedisBackend::Single(conn) => set_nx_px(&mut conn.clone(), key, value, ttl).await?,
            RedisBackend::Cluster(conn) => set_nx_px(&mut conn.clone(), key, value, ttl).await?,
            RedisBackend::Sentinel(sentinel) => {
                sentinel
                    .execute(|mut conn| async move { set_nx_px(&mut conn, key, value, ttl).await })
                    .await?
            }
            RedisBackend::Replica(replica) => {
                set_nx_px(&mut replica.writer.clone(), key, value, ttl).await?
            }
        };

        debug!(key, ?outcome, ttl_ms = ttl.as_millis() as u64, "Redis conditional set");
        Ok(outcome)
    }
}

async fn connect_node(node: &RedisNode, password: Option<&str>) -> CacheResult<ConnectionManager> {
    let client = Client::open(node.connection_info(password))?;
    Ok(ConnectionManager::new(client).await?)
}

async fn get_raw<C>(conn: &mut C, key: &str) -> RedisResult<Option<Vec<u8>>>
where
    C: ConnectionLike + Send,
{
    redis::cmd("GET").arg(key).query_async(conn).await
}

async fn set_nx_px<C>(conn: &mut C, key: &str, value: &[u8], ttl: Duration) -> RedisResult<WriteOutcome>
where
    C: ConnectionLike + Send,
{
    let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
    // Nil reply means the key already holds a value
    let reply: Option<String> = redis::cmd("SET")
        .arg(key)
        .arg(value)
        .arg("NX")
        .arg("PX")
        .arg(ttl_ms)
        .query_async(conn)
        .await?;

    Ok(match reply {
        Some(_) => WriteOutcome::Stored,
        None => WriteOutcome::AlreadyPresent,
    })
}

/// Primary discovered through sentinels
struct SentinelBackend {
    sentinels: Vec<RedisNode>,
    master_name: String,
    password: Option<String>,
    primary: RwLock<ConnectionManager>,
}

impl SentinelBackend {
    async fn connect(
        sentinels: Vec<RedisNode>,
        master_name: String,
        password: Option<String>,
    ) -> CacheResult<Self> {
        let primary = Self::connect_primary(&sentinels, &master_name, password.as_deref()).await?;
        Ok(Self {
            sentinels,
            master_name,
            password,
            primary: RwLock::new(primary),
        })
    }

    async fn connect_primary(
        sentinels: &[RedisNode],
        master_name: &str,
        password: Option<&str>,
    ) -> CacheResult<ConnectionManager> {
        let node = Self::resolve_primary(sentinels, master_name).await?;
        let conn = connect_node(&node, password).await?;
        info!(primary = %node, master_name, "Redis cache connected (sentinel)");
        Ok(conn)
    }

    /// Ask each sentinel in turn for the current primary address
    async fn resolve_primary(sentinels: &[RedisNode], master_name: &str) -> CacheResult<RedisNode> {
        for sentinel in sentinels {
            match Self::ask_sentinel(sentinel, master_name).await {
                Ok(Some(node)) => return Ok(node),
                Ok(None) => warn!(sentinel = %sentinel, master_name, "sentinel does not know the primary"),
                Err(e) => warn!(sentinel = %sentinel, error = %e, "sentinel query failed"),
            }
        }

        Err(CacheError::Store {
            message: format!("no sentinel could resolve primary {}", master_name),
        })
    }

    async fn ask_sentinel(sentinel: &RedisNode, master_name: &str) -> RedisResult<Option<RedisNode>> {
        let client = Client::open(sentinel.connection_info(None))?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let reply: Option<Vec<String>> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(master_name)
            .query_async(&mut conn)
            .await?;

        Ok(reply.and_then(|parts| match parts.as_slice() {
            [host, port] => port.parse().ok().map(|port| RedisNode {
                host: host.clone(),
                port,
            }),
            _ => None,
        }))
    }

    /// Run a command against the primary. On failure the primary is looked up
    /// again and the command retried once.
    async fn execute<T, F, Fut>(&self, operation: F) -> CacheResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.primary.read().await.clone();
        let err = match operation(conn).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        warn!(error = %err, master_name = %self.master_name, "Redis primary command failed, re-resolving");
        match Self::connect_primary(&self.sentinels, &self.master_name, self.password.as_deref()).await {
            Ok(fresh) => {
                *self.primary.write().await = fresh.clone();
                Ok(operation(fresh).await?)
            }
            Err(reconnect_err) => {
                warn!(error = %reconnect_err, "failed to re-resolve Redis primary");
                Err(CacheError::Redis(err))
            }
        }
    }
}

/// Primary for writes, replicas for reads
struct ReplicaBackend {
    writer: ConnectionManager,
    readers: Vec<ConnectionManager>,
}

impl ReplicaBackend {
    async fn connect(writers: &[RedisNode], readers: &[RedisNode], password: Option<&str>) -> CacheResult<Self> {
        // Conditional writes are only first-writer-wins on a single primary,
        // so exactly one writer is used: the first reachable one.
        let mut writer = None;
        for node in writers {
            match connect_node(node, password).await {
                Ok(conn) => {
                    info!(writer = %node, "Redis cache connected (replica writer)");
                    writer = Some(conn);
                    break;
                }
                Err(e) => warn!(writer = %node, error = %e, "Redis writer unreachable"),
            }
        }
        let writer = writer.ok_or_else(|| CacheError::Store {
            message: "no replica writer is reachable".to_string(),
        })?;

        let mut connected = Vec::with_capacity(readers.len());
        for node in readers {
            match connect_node(node, password).await {
                Ok(conn) => connected.push(conn),
                Err(e) => warn!(reader = %node, error = %e, "Redis reader unreachable, skipping"),
            }
        }
        if connected.is_empty() {
            warn!("no Redis reader is reachable, reads will use the writer");
        }
        info!(readers = connected.len(), "Redis cache connected (replica readers)");

        Ok(Self {
            writer,
            readers: connected,
        })
    }

    fn reader(&self) -> ConnectionManager {
        if self.readers.is_empty() {
            return self.writer.clone();
        }
        self.readers[fastrand::usize(..self.readers.len())].clone()
    }
}
