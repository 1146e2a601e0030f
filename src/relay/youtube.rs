//! YouTube Data API v3 client.

use super::{RelayOptions, VideoRelay};
use crate::core::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone)]
pub struct YouTubeRelay {
    client: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeRelay {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(YOUTUBE_API_BASE, api_key)
    }

    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn call(&self, endpoint: &str, options: &RelayOptions) -> GatewayResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query = options.query_pairs();
        query.push(("key", self.api_key.clone()));

        debug!(endpoint, "relaying request upstream");
        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(GatewayError::upstream(format!(
                "{} returned {}: {}",
                endpoint,
                status.as_u16(),
                message
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl VideoRelay for YouTubeRelay {
    async fn search(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.call("search", options).await
    }

    async fn list_by_video_ids(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.call("videos", options).await
    }

    async fn list_playlist_items(&self, options: &RelayOptions) -> GatewayResult<Value> {
        self.call("playlistItems", options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> RelayOptions {
        RelayOptions {
            part: "snippet".to_string(),
            playlist_id: Some("PL1".to_string()),
            max_results: Some(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_forwards_options_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("part", "snippet"))
            .and(query_param("playlistId", "PL1"))
            .and(query_param("maxResults", "5"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "i1"}]})))
            .expect(1)
            .mount(&server)
            .await;

        let relay = YouTubeRelay::with_base_url(server.uri(), "secret");
        let body = relay.list_playlist_items(&options()).await.unwrap();
        assert_eq!(body["items"][0]["id"], "i1");
    }

    #[tokio::test]
    async fn test_upstream_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "quota exceeded"}
            })))
            .mount(&server)
            .await;

        let relay = YouTubeRelay::with_base_url(server.uri(), "secret");
        let err = relay.search(&options()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }
}
