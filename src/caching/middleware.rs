//! # Cache Middleware
//!
//! Axum middleware around the relay handlers. On the way in, a GET request
//! whose path is not disabled is looked up in the cache and a hit is answered
//! directly with the stored status and body. On the way out, the response is
//! written with a conditional set so the first response for a URI wins.
//! Error responses are cached too, under the error TTL.
//!
//! Cache failures never change what the client gets back.

use super::key_generator::ResponseKeyGenerator;
use super::stores::{CacheEntry, CacheProvider, WriteOutcome};
use super::ttl::{ResponseOutcome, TtlResolver, TTL_HEADER};
use crate::core::config::CacheConfig;
use crate::core::error::GatewayError;
use crate::observability::metrics::{CACHE_LOOKUPS_TOTAL, CACHE_WRITES_TOTAL};
use axum::{
    body::{self, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Response header telling whether the cache answered
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Shared state of the cache middleware
#[derive(Clone)]
pub struct CacheLayerState {
    pub provider: Arc<CacheProvider>,
    pub keys: ResponseKeyGenerator,
    pub ttl: Arc<TtlResolver>,
}

impl CacheLayerState {
    pub fn new(provider: Arc<CacheProvider>, namespace: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            provider,
            keys: ResponseKeyGenerator::new(namespace),
            ttl: Arc::new(TtlResolver::new(config)),
        }
    }
}

pub async fn cache_middleware(
    State(state): State<CacheLayerState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let request_uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    if state.ttl.is_disabled(&path, &request_uri) {
        debug!(path = %path, "response cache disabled for path");
        return next.run(request).await;
    }

    let override_header = request
        .headers()
        .get(TTL_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
    let key = state.keys.generate_key(&request_uri);

    if let Some(response) = lookup(&state.provider, &key, &request_uri).await {
        return response;
    }

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    let bytes = match body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return GatewayError::internal(format!("failed to read response body: {}", e)).into_response();
        }
    };

    let outcome = ResponseOutcome::from_status(parts.status);
    let decision = state
        .ttl
        .resolve(&path, &request_uri, override_header.as_deref(), outcome);
    store(&state.provider, &key, &request_uri, parts.status, &bytes, decision.ttl).await;

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// A cached response, or `None` to run the handler. Read failures count as a miss.
async fn lookup(provider: &CacheProvider, key: &str, request_uri: &str) -> Option<Response> {
    let entry = match provider.get(key).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            counter!(CACHE_LOOKUPS_TOTAL, "outcome" => "miss").increment(1);
            return None;
        }
        Err(e) => {
            counter!(CACHE_LOOKUPS_TOTAL, "outcome" => "error").increment(1);
            warn!(key, uri = request_uri, error = %e, "cache read failed, treating as miss");
            return None;
        }
    };

    let status = match StatusCode::from_u16(entry.status_code) {
        Ok(status) => status,
        Err(_) => {
            counter!(CACHE_LOOKUPS_TOTAL, "outcome" => "error").increment(1);
            warn!(key, status = entry.status_code, "cached entry has an invalid status, ignoring");
            return None;
        }
    };

    counter!(CACHE_LOOKUPS_TOTAL, "outcome" => "hit").increment(1);
    debug!(key, uri = request_uri, status = status.as_u16(), "serving response from cache");

    let mut response = (status, [(header::CONTENT_TYPE, "application/json")], entry.body).into_response();
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    Some(response)
}

async fn store(
    provider: &CacheProvider,
    key: &str,
    request_uri: &str,
    status: StatusCode,
    body: &Bytes,
    ttl: Duration,
) {
    if ttl.is_zero() {
        counter!(CACHE_WRITES_TOTAL, "outcome" => "skipped").increment(1);
        return;
    }

    let entry = CacheEntry::new(status.as_u16(), body.clone());
    match provider.set_if_absent(key, &entry, ttl).await {
        Ok(WriteOutcome::Stored) => {
            counter!(CACHE_WRITES_TOTAL, "outcome" => "stored").increment(1);
            info!(uri = request_uri, ttl_secs = ttl.as_secs(), status = status.as_u16(), "response cached");
        }
        Ok(WriteOutcome::AlreadyPresent) => {
            counter!(CACHE_WRITES_TOTAL, "outcome" => "present").increment(1);
            debug!(uri = request_uri, "response already cached by another request");
        }
        Err(e) => {
            counter!(CACHE_WRITES_TOTAL, "outcome" => "error").increment(1);
            warn!(key, uri = request_uri, error = %e, "failed to cache response");
        }
    }
}
