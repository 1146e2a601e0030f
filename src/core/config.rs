//! # Configuration Module
//!
//! Loads and validates the relay configuration.
//!
//! ## Sources
//! - a YAML file (`GatewayConfig::load_from_file`), with environment variables
//!   overriding the simple scalar fields
//! - environment variables only (`GatewayConfig::from_env`), where list and map
//!   settings are given in comma-separated form
//!
//! Every source ends in [`GatewayConfig::validate`], which reports all problems
//! at once. The configuration is read-only after startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::caching::stores::{RedisNode, RedisTopology};
use crate::core::error::{GatewayError, GatewayResult};

/// Main relay configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Application name, used as the cache key namespace.
    /// Only alphanumerics, dot and hyphen are allowed.
    #[serde(default)]
    pub app_name: String,

    /// Bind address
    #[serde(default = "default_address")]
    pub address: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// YouTube Data API key
    #[serde(default)]
    pub api_key: String,

    /// CMS GraphQL endpoint that lists the shows and their playlists
    #[serde(default)]
    pub cms_url: String,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Redis deployment backing the response cache
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Channel and playlist allow-lists
    #[serde(default)]
    pub whitelists: Whitelists,

    /// Minimum time between two playlist refreshes from the CMS
    #[serde(default = "default_refresh_cooldown", with = "humantime_serde")]
    pub refresh_cooldown: Duration,

    /// Log level and output format
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_refresh_cooldown() -> Duration {
    Duration::from_secs(60)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            address: default_address(),
            port: default_port(),
            api_key: String::new(),
            cms_url: String::new(),
            cache: CacheConfig::default(),
            redis: None,
            whitelists: Whitelists::default(),
            refresh_cooldown: default_refresh_cooldown(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable response caching
    #[serde(default)]
    pub enabled: bool,

    /// Expiry for successful responses
    #[serde(default, with = "humantime_serde")]
    pub ttl: Duration,

    /// Expiry for error responses
    #[serde(default, with = "humantime_serde")]
    pub error_ttl: Duration,

    /// Exact request path -> expiry for successful responses
    #[serde(default, with = "duration_map")]
    pub per_path_ttl: HashMap<String, Duration>,

    /// Exact request paths that are never read from or written to the cache
    #[serde(default)]
    pub disabled_paths: HashSet<String>,
}

/// Allow-lists. The value of each entry tells whether it is effective;
/// an entry mapped to `false` is rejected like an absent one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Whitelists {
    #[serde(default)]
    pub channel_ids: HashMap<String, bool>,

    /// Optional static seed, merged under the ids fetched from the CMS at startup
    #[serde(default)]
    pub playlist_ids: HashMap<String, bool>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json` or `text`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Redis deployment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisType {
    Single,
    Cluster,
    Sentinel,
    Replica,
}

impl fmt::Display for RedisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Single => "single",
            Self::Cluster => "cluster",
            Self::Sentinel => "sentinel",
            Self::Replica => "replica",
        };
        f.write_str(name)
    }
}

impl FromStr for RedisType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "cluster" => Ok(Self::Cluster),
            "sentinel" => Ok(Self::Sentinel),
            "replica" => Ok(Self::Replica),
            other => Err(GatewayError::config(format!(
                "redis type({}) is not supported",
                other
            ))),
        }
    }
}

/// Redis configuration. Only the section matching `type` is used, and it
/// must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(rename = "type")]
    pub kind: RedisType,

    #[serde(default)]
    pub single: Option<RedisSingleInstance>,

    #[serde(default)]
    pub cluster: Option<RedisAddressList>,

    #[serde(default)]
    pub sentinel: Option<RedisSentinel>,

    #[serde(default)]
    pub replica: Option<RedisReplicaInstances>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisAddress {
    pub address: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
}

fn default_redis_port() -> u16 {
    6379
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSingleInstance {
    pub instance: RedisAddress,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisAddressList {
    #[serde(default)]
    pub addresses: Vec<RedisAddress>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSentinel {
    #[serde(default)]
    pub addresses: Vec<RedisAddress>,
    #[serde(default)]
    pub password: Option<String>,
    /// Name of the monitored primary
    #[serde(default = "default_master_name")]
    pub master_name: String,
}

fn default_master_name() -> String {
    "mymaster".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisReplicaInstances {
    #[serde(default)]
    pub writers: Vec<RedisAddress>,
    #[serde(default)]
    pub readers: Vec<RedisAddress>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RedisConfig {
    /// Append every consistency problem of this section to `errors`
    fn collect_errors(&self, errors: &mut Vec<String>) {
        let kind = self.kind;
        match kind {
            RedisType::Single => match &self.single {
                None => errors.push(format!(
                    "redis type is set to {} but there is no {} configuration",
                    kind, kind
                )),
                Some(single) if single.instance.address.is_empty() => {
                    errors.push(format!("{} address cannot be empty", kind))
                }
                Some(_) => {}
            },
            RedisType::Cluster => match &self.cluster {
                None => errors.push(format!(
                    "redis type is set to {} but there is no {} configuration",
                    kind, kind
                )),
                Some(cluster) => check_addresses(&cluster.addresses, &kind.to_string(), errors),
            },
            RedisType::Sentinel => match &self.sentinel {
                None => errors.push(format!(
                    "redis type is set to {} but there is no {} configuration",
                    kind, kind
                )),
                Some(sentinel) => {
                    check_addresses(&sentinel.addresses, &kind.to_string(), errors);
                    if sentinel.master_name.is_empty() {
                        errors.push(format!("{} master_name cannot be empty", kind));
                    }
                }
            },
            RedisType::Replica => match &self.replica {
                None => errors.push(format!(
                    "redis type is set to {} but there is no {} configuration",
                    kind, kind
                )),
                Some(replica) => {
                    check_addresses(&replica.writers, &format!("{} writer", kind), errors);
                    check_addresses(&replica.readers, &format!("{} reader", kind), errors);
                }
            },
        }
    }

    /// Resolve the configured deployment into the store topology
    pub fn topology(&self) -> GatewayResult<RedisTopology> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        if !errors.is_empty() {
            return Err(GatewayError::config(errors.join("\n")));
        }

        let missing = || GatewayError::config(format!("missing {} configuration", self.kind));
        let topology = match self.kind {
            RedisType::Single => {
                let single = self.single.as_ref().ok_or_else(missing)?;
                RedisTopology::Single {
                    node: to_node(&single.instance),
                    password: non_empty(&single.password),
                }
            }
            RedisType::Cluster => {
                let cluster = self.cluster.as_ref().ok_or_else(missing)?;
                RedisTopology::Cluster {
                    nodes: cluster.addresses.iter().map(to_node).collect(),
                    password: non_empty(&cluster.password),
                }
            }
            RedisType::Sentinel => {
                let sentinel = self.sentinel.as_ref().ok_or_else(missing)?;
                RedisTopology::Sentinel {
                    sentinels: sentinel.addresses.iter().map(to_node).collect(),
                    master_name: sentinel.master_name.clone(),
                    password: non_empty(&sentinel.password),
                }
            }
            RedisType::Replica => {
                let replica = self.replica.as_ref().ok_or_else(missing)?;
                RedisTopology::Replica {
                    writers: replica.writers.iter().map(to_node).collect(),
                    readers: replica.readers.iter().map(to_node).collect(),
                    password: non_empty(&replica.password),
                }
            }
        };

        Ok(topology)
    }
}

fn check_addresses(addresses: &[RedisAddress], label: &str, errors: &mut Vec<String>) {
    if addresses.is_empty() {
        errors.push(format!("{} addresses cannot be empty", label));
    } else if addresses.iter().any(|addr| addr.address.is_empty()) {
        errors.push(format!("one of the {} addresses is empty", label));
    }
}

fn to_node(addr: &RedisAddress) -> RedisNode {
    RedisNode {
        host: addr.address.clone(),
        port: addr.port,
    }
}

fn non_empty(password: &Option<String>) -> Option<String> {
    password.as_ref().filter(|p| !p.is_empty()).cloned()
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| GatewayError::config(format!("could not read configuration file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("failed to parse configuration: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from a file when one is given, otherwise from the environment
    pub async fn load(path: Option<&Path>) -> GatewayResult<Self> {
        match path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration file");
                Self::load_from_file(path).await
            }
            None => {
                tracing::info!("loading configuration from environment variables");
                Self::from_env()
            }
        }
    }

    fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides_from(&lookup)?;
        config.apply_collection_overrides_from(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides for scalar settings
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides_from(&|name: &str| std::env::var(name).ok())
    }

    fn apply_overrides_from<F>(&mut self, lookup: &F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("APP_NAME") {
            self.app_name = name;
        }
        if let Some(key) = lookup("API_KEY") {
            self.api_key = key;
        }
        if let Some(address) = lookup("ADDRESS") {
            self.address = address;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid PORT: {}", e)))?;
        }
        if let Some(url) = lookup("CMS_URL") {
            self.cms_url = url;
        }
        if let Some(enabled) = lookup("CACHE_ENABLED") {
            self.cache.enabled = parse_bool(&enabled)
                .ok_or_else(|| GatewayError::config(format!("Invalid CACHE_ENABLED: {}", enabled)))?;
        }
        if let Some(ttl) = lookup("CACHE_TTL") {
            self.cache.ttl = parse_seconds("CACHE_TTL", &ttl)?;
        }
        if let Some(ttl) = lookup("CACHE_ERROR_TTL") {
            self.cache.error_ttl = parse_seconds("CACHE_ERROR_TTL", &ttl)?;
        }
        if let Some(cooldown) = lookup("REFRESH_COOLDOWN") {
            self.refresh_cooldown = humantime::parse_duration(cooldown.trim())
                .map_err(|e| GatewayError::config(format!("Invalid REFRESH_COOLDOWN: {}", e)))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Settings that only have a flat form when no file is used:
    /// allow-lists, cache path tables and the redis deployment.
    fn apply_collection_overrides_from<F>(&mut self, lookup: &F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ids) = lookup("WHITELIST_CHANNEL_IDS").filter(|s| !s.is_empty()) {
            self.whitelists.channel_ids = parse_csv_set(&ids)
                .into_iter()
                .map(|id| (id, true))
                .collect();
        }

        if let Some(paths) = lookup("CACHE_DISABLED_APIS").filter(|s| !s.is_empty()) {
            self.cache.disabled_paths = parse_csv_set(&paths);
        }
        if let Some(table) = lookup("CACHE_OVERWRITE_TTL").filter(|s| !s.is_empty()) {
            self.cache.per_path_ttl = parse_csv_ttl_map(&table)?;
        }

        if let Some(kind) = lookup("REDIS_TYPE").filter(|s| !s.is_empty()) {
            let kind: RedisType = kind.parse()?;
            let password = lookup("REDIS_PASSWORD").filter(|p| !p.is_empty());
            let addresses = parse_addresses("REDIS_ADDRESSES", &lookup("REDIS_ADDRESSES").unwrap_or_default())?;

            let mut redis = RedisConfig {
                kind,
                single: None,
                cluster: None,
                sentinel: None,
                replica: None,
            };
            match kind {
                RedisType::Single => {
                    let instance = addresses.into_iter().next().ok_or_else(|| {
                        GatewayError::config("REDIS_ADDRESSES is required for single redis type")
                    })?;
                    redis.single = Some(RedisSingleInstance { instance, password });
                }
                RedisType::Cluster => {
                    redis.cluster = Some(RedisAddressList { addresses, password });
                }
                RedisType::Sentinel => {
                    redis.sentinel = Some(RedisSentinel {
                        addresses,
                        password,
                        master_name: lookup("REDIS_SENTINEL_MASTER")
                            .filter(|m| !m.is_empty())
                            .unwrap_or_else(default_master_name),
                    });
                }
                RedisType::Replica => {
                    let readers = parse_addresses(
                        "REDIS_READER_ADDRESSES",
                        &lookup("REDIS_READER_ADDRESSES").unwrap_or_default(),
                    )?;
                    redis.replica = Some(RedisReplicaInstances {
                        writers: addresses,
                        readers,
                        password,
                    });
                }
            }
            self.redis = Some(redis);
        }

        Ok(())
    }

    /// Validate the configuration, reporting every problem found
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        let valid_app_name = regex::Regex::new(r"^[a-zA-Z0-9.-]+$")
            .map(|re| re.is_match(&self.app_name))
            .unwrap_or(false);
        if !valid_app_name {
            errors.push(format!(
                "app_name({}) can only contain alphanumerics, dots and hyphens, and it cannot be empty",
                self.app_name
            ));
        }

        if self.api_key.is_empty() {
            errors.push("api_key cannot be empty".to_string());
        }

        if self.whitelists.channel_ids.is_empty() {
            errors.push("whitelist's channel ids cannot be empty".to_string());
        }

        if self.cms_url.is_empty() {
            errors.push("cms_url cannot be empty".to_string());
        }

        if self.cache.enabled {
            if self.cache.ttl.is_zero() {
                errors.push("enabled cache's default ttl cannot be zero".to_string());
            }
            if self.cache.error_ttl.is_zero() {
                errors.push("enabled cache's default error ttl cannot be zero".to_string());
            }
            for (path, ttl) in &self.cache.per_path_ttl {
                if ttl.is_zero() {
                    errors.push(format!("enabled cache's ttl for api({}) cannot be zero", path));
                }
            }
            if self.redis.is_none() {
                errors.push("cache is enabled but there is no redis configuration".to_string());
            }
        }

        if let Some(redis) = &self.redis {
            redis.collect_errors(&mut errors);
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }
        match self.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!("Invalid log format: {}", self.logging.format)),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }

    /// Socket address the server binds to
    pub fn bind_address(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_seconds(name: &str, value: &str) -> GatewayResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| crate::config_error!("Invalid {}: {}", name, e))
}

/// Parses `a,b , c` into a set, skipping blanks.
fn parse_csv_set(s: &str) -> HashSet<String> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `path:seconds,path:seconds` into a ttl table.
fn parse_csv_ttl_map(s: &str) -> GatewayResult<HashMap<String, Duration>> {
    let mut table = HashMap::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (path, seconds) = entry.rsplit_once(':').ok_or_else(|| {
            GatewayError::config(format!(
                "failed to parse CACHE_OVERWRITE_TTL: invalid format {:?}, expected key:value",
                entry
            ))
        })?;
        let ttl = parse_seconds("CACHE_OVERWRITE_TTL", seconds)?;
        table.insert(path.trim().to_string(), ttl);
    }
    Ok(table)
}

/// Parses `host:port,host:port` into redis addresses.
fn parse_addresses(name: &str, s: &str) -> GatewayResult<Vec<RedisAddress>> {
    let mut addresses = Vec::new();
    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (host, port) = entry.split_once(':').ok_or_else(|| {
            GatewayError::config(format!(
                "failed to parse {}: invalid address format {:?}, expected host:port",
                name, entry
            ))
        })?;
        let port = port.parse().map_err(|e| {
            GatewayError::config(format!("failed to parse {}: invalid port in {:?}: {}", name, entry, e))
        })?;
        addresses.push(RedisAddress {
            address: host.to_string(),
            port,
        });
    }
    Ok(addresses)
}

/// `humantime` (de)serialization for a path -> duration table
mod duration_map {
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub fn serialize<S>(map: &HashMap<String, Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (path, ttl) in map {
            out.serialize_entry(path, &humantime::format_duration(*ttl).to_string())?;
        }
        out.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<String, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: HashMap<String, humantime_serde::Serde<Duration>> = HashMap::deserialize(deserializer)?;
        Ok(raw.into_iter().map(|(path, ttl)| (path, ttl.into_inner())).collect())
    }
}
