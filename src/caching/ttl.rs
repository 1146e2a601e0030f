//! # Cache TTL Resolution
//!
//! Precedence, highest first:
//! 1. a disabled path is never cached
//! 2. a valid `Cache-Set-TTL` header (positive whole seconds)
//! 3. the per-path TTL, successful responses only
//! 4. the default TTL, or the error TTL for 4xx/5xx responses
//!
//! Paths are matched exactly. A path entry is looked up first by request path
//! and then by the full request URI, so `/search?q=x` can be configured
//! separately from `/search`.

use crate::core::config::CacheConfig;
use axum::http::StatusCode;
use std::time::Duration;
use tracing::warn;

/// Request header carrying a caller-supplied TTL in seconds
pub const TTL_HEADER: &str = "cache-set-ttl";

/// Which default TTL a response falls under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success,
    Error,
}

impl ResponseOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_client_error() || status.is_server_error() {
            Self::Error
        } else {
            Self::Success
        }
    }
}

/// Resolved caching decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlDecision {
    pub ttl: Duration,
    pub disabled: bool,
}

/// TTL resolver over the loaded cache configuration
#[derive(Debug, Clone)]
pub struct TtlResolver {
    config: CacheConfig,
}

impl TtlResolver {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// Whether both reads and writes are skipped for this request
    pub fn is_disabled(&self, path: &str, request_uri: &str) -> bool {
        self.config.disabled_paths.contains(path) || self.config.disabled_paths.contains(request_uri)
    }

    pub fn resolve(
        &self,
        path: &str,
        request_uri: &str,
        override_header: Option<&str>,
        outcome: ResponseOutcome,
    ) -> TtlDecision {
        if self.is_disabled(path, request_uri) {
            return TtlDecision {
                ttl: Duration::ZERO,
                disabled: true,
            };
        }

        let ttl = override_header
            .and_then(|raw| match parse_ttl_override(raw) {
                Ok(ttl) => Some(ttl),
                Err(reason) => {
                    warn!(path, header = TTL_HEADER, value = raw, reason, "ignoring cache ttl override");
                    None
                }
            })
            .unwrap_or_else(|| self.configured_ttl(path, request_uri, outcome));

        TtlDecision { ttl, disabled: false }
    }

    fn configured_ttl(&self, path: &str, request_uri: &str, outcome: ResponseOutcome) -> Duration {
        match outcome {
            ResponseOutcome::Error => self.config.error_ttl,
            ResponseOutcome::Success => self
                .config
                .per_path_ttl
                .get(path)
                .or_else(|| self.config.per_path_ttl.get(request_uri))
                .copied()
                .unwrap_or(self.config.ttl),
        }
    }
}

/// Parse a TTL override header value; it must be a positive integer of seconds
pub fn parse_ttl_override(raw: &str) -> Result<Duration, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty value");
    }
    match raw.parse::<i64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds as u64)),
        Ok(_) => Err("value is not positive"),
        Err(_) => Err("value is not an integer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn resolver() -> TtlResolver {
        TtlResolver::new(CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(300),
            error_ttl: Duration::from_secs(30),
            per_path_ttl: HashMap::from([
                ("/youtube/v3/search".to_string(), Duration::from_secs(600)),
                ("/youtube/v3/videos?part=id&id=special".to_string(), Duration::from_secs(5)),
            ]),
            disabled_paths: HashSet::from(["/x".to_string()]),
        })
    }

    #[test]
    fn test_disabled_path_wins_over_header() {
        let decision = resolver().resolve("/x", "/x?a=1", Some("120"), ResponseOutcome::Success);
        assert!(decision.disabled);
    }

    #[test]
    fn test_default_and_error_ttls() {
        let r = resolver();
        assert_eq!(
            r.resolve("/youtube/v3/videos", "/youtube/v3/videos?id=a", None, ResponseOutcome::Success).ttl,
            Duration::from_secs(300)
        );
        assert_eq!(
            r.resolve("/youtube/v3/videos", "/youtube/v3/videos?id=a", None, ResponseOutcome::Error).ttl,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_header_beats_per_path() {
        let r = resolver();
        let uri = "/youtube/v3/search?part=snippet";
        assert_eq!(
            r.resolve("/youtube/v3/search", uri, None, ResponseOutcome::Success).ttl,
            Duration::from_secs(600)
        );
        assert_eq!(
            r.resolve("/youtube/v3/search", uri, Some("42"), ResponseOutcome::Success).ttl,
            Duration::from_secs(42)
        );
    }

    #[test]
    fn test_per_path_falls_back_to_full_uri() {
        let uri = "/youtube/v3/videos?part=id&id=special";
        let decision = resolver().resolve("/youtube/v3/videos", uri, None, ResponseOutcome::Success);
        assert_eq!(decision.ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_header_falls_through() {
        let r = resolver();
        for bad in ["abc", "0", "-5", "", "1.5"] {
            let decision = r.resolve("/youtube/v3/search", "/youtube/v3/search", Some(bad), ResponseOutcome::Success);
            assert!(!decision.disabled);
            assert_eq!(decision.ttl, Duration::from_secs(600), "header {:?}", bad);
        }
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(ResponseOutcome::from_status(StatusCode::OK), ResponseOutcome::Success);
        assert_eq!(ResponseOutcome::from_status(StatusCode::BAD_REQUEST), ResponseOutcome::Error);
        assert_eq!(
            ResponseOutcome::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            ResponseOutcome::Error
        );
    }
}
