// src/cache/memory.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::{AttemptCache, Versioned};
use crate::error::AppError;

struct Entry {
    value: String,
    version: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local cache with a fixed time-to-live per entry.
///
/// Expired entries are invisible to readers and are dropped either lazily on
/// access or by [`MemoryCache::purge_expired`].
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    /// Versions are never reused, even across delete and re-insert.
    next_version: AtomicU64,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            next_version: AtomicU64::new(1),
        }
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Runs [`MemoryCache::purge_expired`] every `period` until the runtime shuts down.
    pub fn spawn_purge_task(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired attempt cache entries", purged);
                }
            }
        })
    }
}

#[async_trait]
impl AttemptCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Versioned<String>>, AppError> {
        let now = Instant::now();

        // The shard guard must be released before removing from the same map.
        let found = self.entries.get(key).map(|entry| {
            entry.is_live(now).then(|| Versioned {
                value: entry.value.clone(),
                version: entry.version,
            })
        });

        match found {
            Some(Some(live)) => Ok(Some(live)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), AppError> {
        let entry = Entry {
            value,
            version: self.bump(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        version: u64,
        value: String,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };

        if entry.version != version || !entry.is_live(now) {
            return Ok(false);
        }

        entry.value = value;
        entry.version = self.bump();
        entry.expires_at = now + self.ttl;
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("quiz-attempt:a", "one".to_string()).await.unwrap();

        let entry = cache.get("quiz-attempt:a").await.unwrap().unwrap();
        assert_eq!(entry.value, "one");
        assert!(cache.get("quiz-attempt:b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_version() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("k", "v1".to_string()).await.unwrap();
        let first = cache.get("k").await.unwrap().unwrap();

        assert!(cache.compare_and_set("k", first.version, "v2".to_string()).await.unwrap());
        // Second writer still holds the old version.
        assert!(!cache.compare_and_set("k", first.version, "v3".to_string()).await.unwrap());

        let current = cache.get("k").await.unwrap().unwrap();
        assert_eq!(current.value, "v2");
        assert_ne!(current.version, first.version);
    }

    #[tokio::test]
    async fn test_compare_and_set_on_missing_key_fails() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("k", "v1".to_string()).await.unwrap();
        let read = cache.get("k").await.unwrap().unwrap();
        cache.del("k").await.unwrap();

        assert!(!cache.compare_and_set("k", read.version, "v2".to_string()).await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_not_reused_after_reinsert() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set("k", "v1".to_string()).await.unwrap();
        let old = cache.get("k").await.unwrap().unwrap();
        cache.del("k").await.unwrap();
        cache.set("k", "v1".to_string()).await.unwrap();

        assert!(!cache.compare_and_set("k", old.version, "v2".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden_and_purged() {
        let cache = MemoryCache::new(Duration::from_millis(20));
        cache.set("a", "1".to_string()).await.unwrap();
        cache.set("b", "2".to_string()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(cache.get("a").await.unwrap().is_none());
        // "a" was dropped lazily, "b" is still waiting for the purge.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
