//! # Relay Integration Tests
//!
//! Full router with the in-memory cache store, a scripted upstream and a
//! scripted CMS.

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use axum_test::TestServer;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use yt_relay::allowlist::AllowListResult;
use yt_relay::caching::{CacheLayerState, CacheProvider};
use yt_relay::core::config::CacheConfig;
use yt_relay::gateway::metrics_router;
use yt_relay::{build_router, AllowListValidator, AppState, GatewayResult, PlaylistSource, RelayOptions, VideoRelay};

#[derive(Default)]
struct ScriptedRelay {
    search_calls: AtomicUsize,
    video_calls: AtomicUsize,
    playlist_calls: AtomicUsize,
}

#[async_trait]
impl VideoRelay for ScriptedRelay {
    async fn search(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "kind": "youtube#searchListResponse",
            "items": [{"id": {"videoId": "v1"}, "snippet": {"channelId": options.channel_id}}]
        }))
    }

    async fn list_by_video_ids(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Value> = options
            .id
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|id| {
                let channel = if id.starts_with("foreign") { "UC_foreign" } else { "UC_allowed" };
                json!({"id": id, "snippet": {"channelId": channel}})
            })
            .collect();
        Ok(json!({"kind": "youtube#videoListResponse", "items": items}))
    }

    async fn list_playlist_items(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.playlist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"items": [{"snippet": {"playlistId": options.playlist_id}}]}))
    }
}

struct ScriptedCms {
    ids: HashMap<String, bool>,
    calls: AtomicUsize,
}

#[async_trait]
impl PlaylistSource for ScriptedCms {
    async fn fetch_playlist_ids(&self) -> AllowListResult<HashMap<String, bool>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ids.clone())
    }
}

struct Harness {
    app: Router,
    relay: Arc<ScriptedRelay>,
    cms: Arc<ScriptedCms>,
}

struct Reply {
    status: StatusCode,
    cache: Option<String>,
    body: Value,
}

impl Harness {
    /// GET with the URI passed through untouched, so the raw query string
    /// is what the cache keys on.
    async fn get(&self, uri: &str) -> Reply {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let cache = response
            .headers()
            .get("x-cache")
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        Reply { status, cache, body }
    }
}

fn cache_config(disabled: &[&str]) -> CacheConfig {
    CacheConfig {
        enabled: true,
        ttl: Duration::from_secs(300),
        error_ttl: Duration::from_secs(30),
        per_path_ttl: HashMap::new(),
        disabled_paths: disabled.iter().map(|p| p.to_string()).collect::<HashSet<_>>(),
    }
}

fn harness(cache: Option<CacheConfig>) -> Harness {
    let relay = Arc::new(ScriptedRelay::default());
    let cms = Arc::new(ScriptedCms {
        ids: HashMap::from([("PL_new".to_string(), true), ("PL_seed".to_string(), true)]),
        calls: AtomicUsize::new(0),
    });

    let allowlist = AllowListValidator::new(
        HashMap::from([("UC_allowed".to_string(), true), ("UC_disabled".to_string(), false)]),
        HashMap::from([("PL_seed".to_string(), true)]),
        cms.clone(),
        Duration::from_secs(60),
    );

    let cache_layer = cache.map(|config| {
        CacheLayerState::new(Arc::new(CacheProvider::in_memory()), "yt-relay-test", config)
    });

    let app: Router = build_router(
        AppState {
            relay: relay.clone(),
            allowlist: Arc::new(allowlist),
        },
        cache_layer,
    );

    Harness {
        app,
        relay,
        cms,
    }
}

#[tokio::test]
async fn test_health() {
    let h = harness(None);
    let server = TestServer::new(h.app.clone()).unwrap();
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_search_requires_part() {
    let h = harness(Some(cache_config(&[])));

    let reply = h.get("/youtube/v3/search?channelId=UC_allowed").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body, json!({"error": "part cannot be empty"}));
}

#[tokio::test]
async fn test_search_rejects_unlisted_and_ineffective_channels() {
    let h = harness(None);

    for channel in ["UC_unknown", "UC_disabled"] {
        let reply = h
            .get(&format!("/youtube/v3/search?part=snippet&channelId={}", channel))
            .await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body, json!({"error": format!("channelId({}) is invalid", channel)}));
    }
    assert_eq!(h.relay.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_successful_search_is_served_from_cache() {
    let h = harness(Some(cache_config(&[])));
    let uri = "/youtube/v3/search?part=snippet&channelId=UC_allowed";

    let first = h.get(uri).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache.as_deref(), Some("MISS"));

    let second = h.get(uri).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.cache.as_deref(), Some("HIT"));
    assert_eq!(second.body, first.body);
    assert_eq!(h.relay.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_channel_is_cached_as_error() {
    let h = harness(Some(cache_config(&[])));
    let uri = "/youtube/v3/search?part=snippet&channelId=bad";

    let first = h.get(uri).await;
    assert_eq!(first.status, StatusCode::BAD_REQUEST);
    assert_eq!(first.cache.as_deref(), Some("MISS"));

    let second = h.get(uri).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.cache.as_deref(), Some("HIT"));
    assert_eq!(second.body, json!({"error": "channelId(bad) is invalid"}));
}

#[tokio::test]
async fn test_legacy_prefix_shares_cache_entry() {
    let h = harness(Some(cache_config(&[])));

    let first = h.get("/youtube/v3/search?part=snippet&channelId=UC_allowed").await;
    assert_eq!(first.status, StatusCode::OK);
    let legacy = h.get("/api/youtube/search?part=snippet&channelId=UC_allowed").await;

    assert_eq!(legacy.status, StatusCode::OK);
    assert_eq!(legacy.cache.as_deref(), Some("HIT"));
    assert_eq!(h.relay.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_playlist_is_cached_as_error() {
    let h = harness(Some(cache_config(&[])));
    let uri = "/youtube/v3/playlistItems?part=snippet&playlistId=PL_unknown";

    let first = h.get(uri).await;
    assert_eq!(first.status, StatusCode::BAD_REQUEST);
    assert_eq!(first.body, json!({"error": "playlistId(PL_unknown) is invalid"}));
    assert_eq!(h.cms.calls.load(Ordering::SeqCst), 1);

    let second = h.get(uri).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.cache.as_deref(), Some("HIT"));
    assert_eq!(second.body, first.body);
    assert_eq!(h.cms.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.relay.playlist_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_playlist_miss_refreshes_from_cms() {
    let h = harness(None);

    let seeded = h.get("/youtube/v3/playlistItems?part=snippet&playlistId=PL_seed").await;
    assert_eq!(seeded.status, StatusCode::OK);
    assert_eq!(h.cms.calls.load(Ordering::SeqCst), 0);

    let refreshed = h.get("/youtube/v3/playlistItems?part=snippet&playlistId=PL_new").await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert_eq!(refreshed.body, json!({"items": [{"snippet": {"playlistId": "PL_new"}}]}));
    assert_eq!(h.cms.calls.load(Ordering::SeqCst), 1);

    let rejected = h.get("/youtube/v3/playlistItems?part=snippet&playlistId=PL_other").await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(h.cms.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_videos_validation() {
    let h = harness(None);

    let missing_id = h.get("/youtube/v3/videos?part=snippet").await;
    assert_eq!(missing_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_id.body, json!({"error": "id cannot be empty"}));

    let allowed = h.get("/youtube/v3/videos?part=snippet&id=v1,v2").await;
    assert_eq!(allowed.status, StatusCode::OK);

    let foreign = h.get("/youtube/v3/videos?part=snippet&id=v1,foreign1").await;
    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        foreign.body,
        json!({"error": "some video's channel id is invalid: channelId(UC_foreign) is invalid"})
    );
    assert_eq!(h.relay.video_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disabled_path_is_never_cached() {
    let h = harness(Some(cache_config(&["/youtube/v3/videos"])));
    let uri = "/youtube/v3/videos?part=snippet&id=v1";

    for _ in 0..2 {
        let reply = h.get(uri).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.cache.is_none());
    }
    assert_eq!(h.relay.video_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_without_cache_layer_every_request_reaches_upstream() {
    let h = harness(None);
    let uri = "/youtube/v3/search?part=snippet&channelId=UC_allowed";

    assert_eq!(h.get(uri).await.status, StatusCode::OK);
    let second = h.get(uri).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.cache.is_none());
    assert_eq!(h.relay.search_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cache_counters_are_exposed_on_metrics_route() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let exposition = metrics::with_local_recorder(&recorder, || {
        runtime.block_on(async {
            let h = harness(Some(cache_config(&[])));
            let uri = "/youtube/v3/search?part=snippet&channelId=UC_allowed";
            assert_eq!(h.get(uri).await.cache.as_deref(), Some("MISS"));
            assert_eq!(h.get(uri).await.cache.as_deref(), Some("HIT"));

            let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
            let response = metrics_router(handle.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        })
    });

    assert!(exposition.contains("yt_relay_cache_lookups_total{outcome=\"miss\"} 1"));
    assert!(exposition.contains("yt_relay_cache_lookups_total{outcome=\"hit\"} 1"));
    assert!(exposition.contains("yt_relay_cache_writes_total{outcome=\"stored\"} 1"));
}
