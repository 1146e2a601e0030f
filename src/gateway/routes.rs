//! # Relay Routes
//!
//! - `GET /health`
//! - `GET /metrics`: Prometheus text format, when a recorder is installed
//! - `GET /youtube/v3/search`: `part` required, `channelId` must be allowed
//! - `GET /youtube/v3/videos`: `part` and `id` required, and every returned
//!   video must belong to an allowed channel
//! - `GET /youtube/v3/playlistItems`: `part` required, `playlistId` must be allowed
//!
//! `/api/youtube/<endpoint>` is served as `/youtube/v3/<endpoint>`. The cache
//! middleware wraps only the `/youtube/v3` endpoints and sees the rewritten URI.

use crate::allowlist::AllowListValidator;
use crate::caching::{cache_middleware, CacheLayerState};
use crate::core::error::{GatewayError, GatewayResult};
use crate::relay::{RelayOptions, VideoRelay};
use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::{header, StatusCode, Uri},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::warn;

const YOUTUBE_PREFIX: &str = "/youtube/v3/";
const LEGACY_PREFIX: &str = "/api/youtube/";

/// State shared by the relay handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<dyn VideoRelay>,
    pub allowlist: Arc<AllowListValidator>,
}

/// Build the relay router. Pass `cache` only when response caching is enabled.
pub fn build_router(state: AppState, cache: Option<CacheLayerState>) -> Router {
    let mut youtube = Router::new()
        .route("/youtube/v3/search", get(search))
        .route("/youtube/v3/videos", get(list_videos))
        .route("/youtube/v3/playlistItems", get(list_playlist_items))
        .with_state(state);

    if let Some(cache) = cache {
        youtube = youtube.layer(from_fn_with_state(cache, cache_middleware));
    }

    let legacy = ServiceExt::<Request>::map_request(youtube.clone(), rewrite_legacy_path);

    Router::new()
        .route("/health", get(health))
        .merge(youtube)
        .route_service("/api/youtube/*endpoint", legacy)
        .layer(TraceLayer::new_for_http())
}

/// `GET /metrics` rendering the installed Prometheus recorder
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}

fn rewrite_legacy_path(mut request: Request) -> Request {
    let Some(rest) = request.uri().path().strip_prefix(LEGACY_PREFIX) else {
        return request;
    };

    let rewritten = match request.uri().query() {
        Some(query) => format!("{}{}?{}", YOUTUBE_PREFIX, rest, query),
        None => format!("{}{}", YOUTUBE_PREFIX, rest),
    };
    match rewritten.parse::<Uri>() {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => warn!(error = %e, "could not rewrite legacy path"),
    }
    request
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn search(
    State(state): State<AppState>,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Json<Value>> {
    respond("/youtube/v3/search", relay_search(&state, query).await)
}

async fn list_videos(
    State(state): State<AppState>,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Json<Value>> {
    respond("/youtube/v3/videos", relay_videos(&state, query).await)
}

async fn list_playlist_items(
    State(state): State<AppState>,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Json<Value>> {
    respond("/youtube/v3/playlistItems", relay_playlist_items(&state, query).await)
}

async fn relay_search(
    state: &AppState,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Value> {
    let options = parse_options(query)?;
    require_part(&options)?;

    let channel_id = options.channel_id.as_deref().unwrap_or_default();
    if !state.allowlist.validate_channel(channel_id) {
        return Err(invalid_channel(channel_id));
    }

    state.relay.search(&options).await
}

async fn relay_videos(
    state: &AppState,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Value> {
    let options = parse_options(query)?;
    require_part(&options)?;
    if options.id.as_deref().unwrap_or_default().is_empty() {
        return Err(GatewayError::validation("id", "id cannot be empty"));
    }

    let body = state.relay.list_by_video_ids(&options).await?;
    check_video_channels(&state.allowlist, &body)?;
    Ok(body)
}

async fn relay_playlist_items(
    state: &AppState,
    query: Result<Query<RelayOptions>, QueryRejection>,
) -> GatewayResult<Value> {
    let options = parse_options(query)?;
    require_part(&options)?;

    let playlist_id = options.playlist_id.as_deref().unwrap_or_default();
    if !state.allowlist.validate_playlist(playlist_id).await {
        return Err(GatewayError::validation(
            "playlistId",
            format!("playlistId({}) is invalid", playlist_id),
        ));
    }

    state.relay.list_playlist_items(&options).await
}

fn respond(path: &'static str, result: GatewayResult<Value>) -> GatewayResult<Json<Value>> {
    result.map(Json).map_err(|e| {
        warn!(path, error_type = e.error_type(), error = %e, "request failed");
        e
    })
}

fn parse_options(query: Result<Query<RelayOptions>, QueryRejection>) -> GatewayResult<RelayOptions> {
    query
        .map(|Query(options)| options)
        .map_err(|rejection| GatewayError::validation("query", rejection.body_text()))
}

fn require_part(options: &RelayOptions) -> GatewayResult<()> {
    if options.part.is_empty() {
        return Err(GatewayError::validation("part", "part cannot be empty"));
    }
    Ok(())
}

fn invalid_channel(channel_id: &str) -> GatewayError {
    GatewayError::validation("channelId", format!("channelId({}) is invalid", channel_id))
}

/// Every listed video must come from an allowed channel
fn check_video_channels(allowlist: &AllowListValidator, body: &Value) -> GatewayResult<()> {
    let items = body.get("items").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    for item in items {
        let channel_id = item
            .pointer("/snippet/channelId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !allowlist.validate_channel(channel_id) {
            return Err(GatewayError::validation(
                "channelId",
                format!("some video's channel id is invalid: channelId({}) is invalid", channel_id),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[test]
    fn test_rewrite_legacy_path_keeps_query() {
        let rewritten = rewrite_legacy_path(request("/api/youtube/search?part=snippet&channelId=UC1"));
        assert_eq!(rewritten.uri(), "/youtube/v3/search?part=snippet&channelId=UC1");

        let rewritten = rewrite_legacy_path(request("/api/youtube/videos"));
        assert_eq!(rewritten.uri(), "/youtube/v3/videos");
    }

    #[test]
    fn test_rewrite_ignores_other_paths() {
        let untouched = rewrite_legacy_path(request("/health"));
        assert_eq!(untouched.uri(), "/health");
    }
}
