//! In-memory store for synthesized speech awaiting Twilio playback.
//!
//! Twilio fetches `<Play>` audio over HTTP, so synthesized buffers are
//! parked here under an opaque id until the provider collects them. The
//! cache is bounded by total bytes and by entry age; nothing survives a
//! restart, which is fine because every entry can be re-synthesized.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Total resident bytes the cache aims to stay under
pub const MAX_CACHE_BYTES: usize = 100 * 1024 * 1024;
/// How long an untouched entry stays reachable
pub const ENTRY_TTL: Duration = Duration::from_secs(15 * 60);
/// How often the background sweep runs
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedAudio {
    bytes: Vec<u8>,
    /// Refreshed on read as well as on write
    last_access: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CachedAudio>,
    total_bytes: usize,
}

impl CacheInner {
    fn remove(&mut self, id: &str) -> Option<CachedAudio> {
        let removed = self.entries.remove(id);
        if let Some(ref audio) = removed {
            self.total_bytes -= audio.bytes.len();
        }
        removed
    }

    fn sweep_expired(&mut self, ttl: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(ttl).unwrap_or_default();
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, audio)| audio.last_access < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale.len()
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, audio)| audio.last_access)
            .map(|(id, _)| id.clone())?;
        self.remove(&oldest);
        Some(oldest)
    }
}

/// Size- and TTL-bounded audio store
#[derive(Debug)]
pub struct AudioCache {
    inner: Arc<RwLock<CacheInner>>,
    max_bytes: usize,
    ttl: Duration,
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCache {
    pub fn new() -> Self {
        Self::with_settings(MAX_CACHE_BYTES, ENTRY_TTL)
    }

    pub fn with_settings(max_bytes: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            max_bytes,
            ttl,
        }
    }

    /// Store audio bytes and return the opaque id Twilio will fetch by.
    ///
    /// Expired entries are swept first; if the insert would still push the
    /// byte total over capacity, the single least-recently-touched entry is
    /// evicted. Eviction deliberately runs at most once per insert, so one
    /// very large buffer can leave the cache over its bound until the next
    /// sweep.
    pub async fn put(&self, bytes: Vec<u8>) -> String {
        let id = Uuid::new_v4().to_string();
        let size = bytes.len();

        let mut inner = self.inner.write().await;
        inner.sweep_expired(self.ttl);

        if inner.total_bytes + size > self.max_bytes {
            if let Some(evicted) = inner.evict_least_recent() {
                debug!("Evicted audio {} to make room", evicted);
            }
        }

        if inner.total_bytes + size > self.max_bytes {
            warn!(
                "Audio cache over capacity after single eviction ({} + {} bytes)",
                inner.total_bytes, size
            );
        }

        inner.total_bytes += size;
        inner.entries.insert(
            id.clone(),
            CachedAudio {
                bytes,
                last_access: Utc::now(),
            },
        );

        debug!("Cached audio {} ({} bytes)", id, size);
        id
    }

    /// Fetch audio bytes, refreshing the entry's last-access time.
    ///
    /// Unknown and expired ids both come back as `None`.
    pub async fn get(&self, id: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.write().await;

        let expired = {
            let audio = inner.entries.get(id)?;
            let cutoff = Utc::now() - chrono::Duration::from_std(self.ttl).unwrap_or_default();
            audio.last_access < cutoff
        };
        if expired {
            inner.remove(id);
            return None;
        }

        let audio = inner.entries.get_mut(id)?;
        audio.last_access = Utc::now();
        Some(audio.bytes.clone())
    }

    /// Remove all entries older than the TTL; returns how many went
    pub async fn sweep_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let removed = inner.sweep_expired(self.ttl);
        if removed > 0 {
            info!("Swept {} expired audio entr(ies)", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn total_bytes(&self) -> usize {
        self.inner.read().await.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let cache = AudioCache::new();
        let id = cache.put(vec![7u8; 1024]).await;

        let bytes = cache.get(&id).await.expect("audio should be present");
        assert_eq!(bytes.len(), 1024);
        assert_eq!(cache.total_bytes().await, 1024);

        assert!(cache.get("no-such-id").await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_touched() {
        let cache = AudioCache::with_settings(3 * 1024, Duration::from_secs(60));
        let first = cache.put(vec![0u8; 1024]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = cache.put(vec![0u8; 1024]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Touch the oldest entry so the middle one becomes least-recent.
        cache.get(&first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let third = cache.put(vec![0u8; 2048]).await;

        assert!(cache.get(&second).await.is_none(), "LRU entry survives");
        assert!(cache.get(&first).await.is_some());
        assert!(cache.get(&third).await.is_some());
        assert!(cache.total_bytes().await <= 3 * 1024 + 1024);
    }

    // Eviction runs once per insert even when that is not enough room. This
    // pins the behavior down rather than fixing it; see DESIGN.md.
    #[tokio::test]
    async fn test_single_eviction_can_leave_cache_over_capacity() {
        let cache = AudioCache::with_settings(4 * 1024, Duration::from_secs(60));
        cache.put(vec![0u8; 1024]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put(vec![0u8; 1024]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put(vec![0u8; 1024]).await;

        // Inserting a 4 KiB buffer only evicts one 1 KiB entry.
        cache.put(vec![0u8; 4 * 1024]).await;

        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.total_bytes().await, 2 * 1024 + 4 * 1024);
        assert!(cache.total_bytes().await > 4 * 1024);
    }

    #[tokio::test]
    async fn test_expired_entries_unreachable_after_sweep() {
        let cache = AudioCache::with_settings(MAX_CACHE_BYTES, Duration::from_millis(50));
        let id = cache.put(vec![0u8; 256]).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 1);
        assert!(cache.get(&id).await.is_none());
        assert_eq!(cache.total_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_get_refreshes_last_access() {
        let cache = AudioCache::with_settings(MAX_CACHE_BYTES, Duration::from_millis(100));
        let id = cache.put(vec![0u8; 256]).await;

        // Keep touching the entry past its original TTL window.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(60)).await;
            assert!(cache.get(&id).await.is_some());
        }

        cache.sweep_expired().await;
        assert!(cache.get(&id).await.is_some());
    }
}
