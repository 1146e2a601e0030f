//! CMS GraphQL client listing the playlists of every show.

use super::validator::PlaylistSource;
use super::{AllowListError, AllowListResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;

const SHOWS_QUERY: &str = "{\n  shows {\n    playList01\n    playList02\n    trailerPlaylist\n  }\n}";

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct ShowsResponse {
    #[serde(default)]
    data: Option<ShowsData>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Deserialize)]
struct ShowsData {
    #[serde(default)]
    shows: Vec<ShowFields>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShowFields {
    play_list01: Option<String>,
    play_list02: Option<String>,
    trailer_playlist: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// Fetches playlist ids from the CMS
#[derive(Debug, Clone)]
pub struct CmsClient {
    client: Client,
    url: String,
}

impl CmsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PlaylistSource for CmsClient {
    async fn fetch_playlist_ids(&self) -> AllowListResult<HashMap<String, bool>> {
        let response = self
            .client
            .post(&self.url)
            .json(&GraphQlRequest { query: SHOWS_QUERY })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(AllowListError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: ShowsResponse = response.json().await?;
        if let Some(first) = body.errors.into_iter().next() {
            return Err(AllowListError::GraphQl {
                message: first.message,
            });
        }

        let shows = body.data.map(|data| data.shows).unwrap_or_default();
        let ids: HashMap<String, bool> = shows
            .iter()
            .flat_map(|show| [&show.play_list01, &show.play_list02, &show.trailer_playlist])
            .filter_map(|field| field.as_deref().and_then(extract_playlist_id))
            .map(|id| (id, true))
            .collect();

        info!(playlists = ids.len(), shows = shows.len(), "fetched playlist ids from CMS");
        Ok(ids)
    }
}

fn playlist_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").expect("playlist id pattern is valid"))
}

/// Pull the playlist id out of a CMS field, which usually holds a playlist
/// URL optionally followed by a description
pub fn extract_playlist_id(field: &str) -> Option<String> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    playlist_id_pattern()
        .captures(field)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_playlist_id() {
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/playlist?list=PL1jBQxu5Ekl：宵夜"),
            Some("PL1jBQxu5Ekl".to_string())
        );
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/watch?v=abc&list=PL_a-b"),
            Some("PL_a-b".to_string())
        );
        assert_eq!(extract_playlist_id("  "), None);
        assert_eq!(extract_playlist_id("https://www.youtube.com/watch?v=abc"), None);
    }

    #[tokio::test]
    async fn test_fetch_playlist_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"query": SHOWS_QUERY})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"shows": [
                    {
                        "playList01": "https://www.youtube.com/playlist?list=PL1",
                        "playList02": null,
                        "trailerPlaylist": "https://www.youtube.com/playlist?list=TR1 trailer"
                    },
                    {"playList01": "no playlist here", "playList02": "https://youtube.com/playlist?list=PL2"}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ids = CmsClient::new(server.uri()).fetch_playlist_ids().await.unwrap();
        assert_eq!(ids.len(), 3);
        for id in ["PL1", "PL2", "TR1"] {
            assert_eq!(ids.get(id), Some(&true));
        }
    }

    #[tokio::test]
    async fn test_non_ok_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = CmsClient::new(server.uri()).fetch_playlist_ids().await;
        assert!(matches!(result, Err(AllowListError::Status { status: 503 })));
    }

    #[tokio::test]
    async fn test_graphql_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": "access denied"}, {"message": "second"}]
            })))
            .mount(&server)
            .await;

        match CmsClient::new(server.uri()).fetch_playlist_ids().await {
            Err(AllowListError::GraphQl { message }) => assert_eq!(message, "access denied"),
            other => panic!("unexpected result: {:?}", other.map(|ids| ids.len())),
        }
    }
}
