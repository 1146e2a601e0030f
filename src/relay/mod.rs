//! # Upstream Video Relay
//!
//! Query options accepted from callers and the client that forwards them to
//! the video platform.

pub mod youtube;

pub use youtube::YouTubeRelay;

use crate::core::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query parameters understood by the relay endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOptions {
    #[serde(default)]
    pub part: String,
    pub channel_id: Option<String>,
    pub id: Option<String>,
    pub playlist_id: Option<String>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub order: Option<String>,
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub fields: Option<String>,
    pub published_after: Option<String>,
    pub published_before: Option<String>,
}

impl RelayOptions {
    /// Non-empty options as upstream query pairs
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.part.is_empty() {
            pairs.push(("part", self.part.clone()));
        }
        let optional = [
            ("channelId", &self.channel_id),
            ("id", &self.id),
            ("playlistId", &self.playlist_id),
            ("pageToken", &self.page_token),
            ("order", &self.order),
            ("q", &self.q),
            ("type", &self.kind),
            ("fields", &self.fields),
            ("publishedAfter", &self.published_after),
            ("publishedBefore", &self.published_before),
        ];
        pairs.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.as_ref().filter(|v| !v.is_empty()).map(|v| (name, v.clone()))),
        );
        if let Some(max_results) = self.max_results {
            pairs.push(("maxResults", max_results.to_string()));
        }
        pairs
    }
}

/// Client of the upstream video API
#[async_trait]
pub trait VideoRelay: Send + Sync {
    async fn search(&self, options: &RelayOptions) -> GatewayResult<Value>;

    async fn list_by_video_ids(&self, options: &RelayOptions) -> GatewayResult<Value>;

    async fn list_playlist_items(&self, options: &RelayOptions) -> GatewayResult<Value>;
}
