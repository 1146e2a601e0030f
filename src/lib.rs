//! # yt-relay
//!
//! A relay in front of the YouTube Data API. It forwards read-only catalog
//! queries for allowed channels and playlists, and caches the upstream
//! responses in Redis.
//!
//! ## Module layout
//! - `core`: configuration and error types
//! - `caching`: cache keys, TTL resolution, the cache middleware and stores
//! - `allowlist`: channel and playlist allow-lists, refreshed from the CMS
//! - `relay`: the upstream video API client
//! - `gateway`: routes and the HTTP server
//! - `observability`: logging and metrics setup

/// Configuration, error types and shared result aliases
pub mod core;

/// Response caching over Redis or an in-process store
pub mod caching;

/// Channel and playlist allow-lists
pub mod allowlist;

/// Upstream video API client
pub mod relay;

/// Routes and server
pub mod gateway;

/// Logging and metrics
pub mod observability;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};

pub use allowlist::{AllowListValidator, CmsClient, PlaylistSource};
pub use caching::{CacheEntry, CacheProvider, RedisTopology};
pub use gateway::{build_router, AppState, RelayServer};
pub use relay::{RelayOptions, VideoRelay, YouTubeRelay};
