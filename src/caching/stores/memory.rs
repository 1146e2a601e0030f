//! # In-Memory Cache Store
//!
//! Process-local backend with per-entry expiry. Conditional writes are atomic
//! per key through the map's shard locks. Expired entries are dropped when they
//! are read or overwritten, and every `SWEEP_EVERY` writes a sweep removes
//! the expired entries nobody touched again.

use super::WriteOutcome;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SWEEP_EVERY: u64 = 64;

struct StoredValue {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory cache implementation
#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
    writes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(stored) if stored.is_live(now) => return Some(stored.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, stored| !stored.is_live(now));
            debug!(key, "dropped expired in-memory cache entry");
        }
        None
    }

    pub fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> WriteOutcome {
        let now = Instant::now();
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.purge_expired(now);
        }

        let stored = StoredValue {
            value: value.to_vec(),
            expires_at: now + ttl,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(existing) if existing.get().is_live(now) => WriteOutcome::AlreadyPresent,
            Entry::Occupied(mut existing) => {
                existing.insert(stored);
                WriteOutcome::Stored
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
                WriteOutcome::Stored
            }
        }
    }

    fn purge_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "swept expired in-memory cache entries");
        }
    }

    /// Number of entries held, live or not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_if_absent_keeps_first_value() {
        let store = InMemoryStore::new();

        assert_eq!(store.set_if_absent("k", b"first", Duration::from_secs(60)), WriteOutcome::Stored);
        assert_eq!(
            store.set_if_absent("k", b"second", Duration::from_secs(60)),
            WriteOutcome::AlreadyPresent
        );
        assert_eq!(store.get("k"), Some(b"first".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss_and_can_be_replaced() {
        let store = InMemoryStore::new();
        store.set_if_absent("k", b"old", Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());

        store.set_if_absent("k", b"stale", Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.set_if_absent("k", b"new", Duration::from_secs(5)), WriteOutcome::Stored);
        assert_eq!(store.get("k"), Some(b"new".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untouched_expired_entries_are_swept() {
        let store = InMemoryStore::new();
        store.set_if_absent("abandoned", b"old", Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;

        for i in 1..SWEEP_EVERY {
            store.set_if_absent(&format!("k{}", i), b"v", Duration::from_secs(60));
        }

        assert_eq!(store.len(), (SWEEP_EVERY - 1) as usize);
        assert_eq!(store.get("k1"), Some(b"v".to_vec()));
    }
}
