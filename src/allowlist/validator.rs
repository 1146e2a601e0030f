//! # Allow-list Validator
//!
//! An entry passes only if it is present and marked effective.
//!
//! Playlist lookups take the read lock first. On a miss the write lock is
//! taken and held for the whole refresh, so concurrent misses share a single
//! CMS call. A refresh replaces the playlist set wholesale and is skipped
//! while the last attempt is younger than the cooldown. Failed attempts count
//! as attempts: an unreachable CMS is retried once per cooldown window, not
//! once per request.

use super::{AllowListError, AllowListResult};
use crate::observability::metrics::ALLOWLIST_REFRESH_TOTAL;
use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Source of the current playlist allow-list
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Fetch the complete set of playlist ids, mapped to whether each is effective
    async fn fetch_playlist_ids(&self) -> AllowListResult<HashMap<String, bool>>;
}

struct PlaylistState {
    ids: HashMap<String, bool>,
    last_fetch: Option<Instant>,
}

impl PlaylistState {
    fn allows(&self, id: &str) -> bool {
        is_effective(&self.ids, id)
    }
}

fn is_effective(ids: &HashMap<String, bool>, id: &str) -> bool {
    ids.get(id).copied().unwrap_or(false)
}

/// Channel and playlist allow-list checks
pub struct AllowListValidator {
    channel_ids: HashMap<String, bool>,
    playlists: RwLock<PlaylistState>,
    source: Arc<dyn PlaylistSource>,
    cooldown: Duration,
}

impl AllowListValidator {
    /// Build a validator over an already known playlist set.
    ///
    /// The seed does not start a cooldown window; the first miss may refresh
    /// immediately.
    pub fn new(
        channel_ids: HashMap<String, bool>,
        playlist_ids: HashMap<String, bool>,
        source: Arc<dyn PlaylistSource>,
        cooldown: Duration,
    ) -> Self {
        Self {
            channel_ids,
            playlists: RwLock::new(PlaylistState {
                ids: playlist_ids,
                last_fetch: None,
            }),
            source,
            cooldown,
        }
    }

    /// Build a validator seeded from `source`, with `configured` entries kept
    /// where the source has no entry of its own.
    ///
    /// Fails if the source errors or returns nothing: the relay must not
    /// serve without an initial playlist set.
    pub async fn seeded(
        channel_ids: HashMap<String, bool>,
        configured: HashMap<String, bool>,
        source: Arc<dyn PlaylistSource>,
        cooldown: Duration,
    ) -> AllowListResult<Self> {
        let fetched = source.fetch_playlist_ids().await?;
        if fetched.is_empty() {
            return Err(AllowListError::Empty);
        }

        let mut ids = configured;
        ids.extend(fetched);
        info!(playlists = ids.len(), channels = channel_ids.len(), "allow-list seeded");

        Ok(Self::new(channel_ids, ids, source, cooldown))
    }

    pub fn validate_channel(&self, channel_id: &str) -> bool {
        is_effective(&self.channel_ids, channel_id)
    }

    pub async fn validate_playlist(&self, playlist_id: &str) -> bool {
        if self.playlists.read().await.allows(playlist_id) {
            return true;
        }

        self.refresh_and_validate(playlist_id).await
    }

    async fn refresh_and_validate(&self, playlist_id: &str) -> bool {
        let mut state = self.playlists.write().await;

        // Another request may have refreshed while we waited for the lock
        if state.allows(playlist_id) {
            return true;
        }

        if let Some(last_fetch) = state.last_fetch {
            if last_fetch.elapsed() < self.cooldown {
                counter!(ALLOWLIST_REFRESH_TOTAL, "outcome" => "cooldown").increment(1);
                debug!(playlist_id, "playlist not allowed, refresh is cooling down");
                return false;
            }
        }

        let fetched = self.source.fetch_playlist_ids().await;
        state.last_fetch = Some(Instant::now());

        match fetched {
            Ok(ids) => {
                counter!(ALLOWLIST_REFRESH_TOTAL, "outcome" => "success").increment(1);
                info!(playlists = ids.len(), "playlist allow-list refreshed");
                state.ids = ids;
                state.allows(playlist_id)
            }
            Err(e) => {
                counter!(ALLOWLIST_REFRESH_TOTAL, "outcome" => "failure").increment(1);
                error!(error = %e, "failed to refresh playlist allow-list from CMS");
                false
            }
        }
    }

    /// Number of playlist ids currently held, effective or not
    pub async fn playlist_count(&self) -> usize {
        self.playlists.read().await.ids.len()
    }
}
