//! Cache tiers.
//!
//! The fast tier lives in process memory; the persistent tier is shared across processes and
//! provided by infra (see `infra::db::cache`).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tracing::warn;

use super::config::CacheConfig;
use super::error::CacheError;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::tier";

/// One layer of key/value storage with per-entry expiry.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Short label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Drop expired entries, returning how many were removed.
    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }
}

struct Slot {
    value: Bytes,
    expires_at: Instant,
}

/// In-process LRU tier.
pub struct LruTier {
    entries: Mutex<LruCache<String, Slot>>,
}

impl LruTier {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.fast_tier_capacity_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheTier for LruTier {
    fn name(&self) -> &'static str {
        "fast"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => return Ok(Some(slot.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            warn!(tier = "fast", ttl_secs = ttl.as_secs(), "ttl out of range, write skipped");
            return Ok(());
        };
        let slot = Slot { value, expires_at };
        mutex_lock(&self.entries, SOURCE, "set").put(key.to_string(), slot);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "sweep_expired");
        let now = Instant::now();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn tier(capacity: usize) -> LruTier {
        LruTier::new(&CacheConfig {
            fast_tier_capacity: capacity,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn stores_and_returns_values() {
        let tier = tier(4);
        assert!(tier.get("a").await.unwrap().is_none());

        tier.set("a", Bytes::from("one"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(tier.get("a").await.unwrap(), Some(Bytes::from("one")));
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_read() {
        let tier = tier(4);
        tier.set("a", Bytes::from("one"), Duration::ZERO)
            .await
            .unwrap();

        assert!(tier.get("a").await.unwrap().is_none());
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let tier = tier(4);
        tier.set("stale", Bytes::from("x"), Duration::ZERO)
            .await
            .unwrap();
        tier.set("fresh", Bytes::from("y"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(tier.sweep_expired().await.unwrap(), 1);
        assert_eq!(tier.len(), 1);
        assert!(tier.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let tier = tier(2);
        let ttl = Duration::from_secs(60);
        tier.set("a", Bytes::from("1"), ttl).await.unwrap();
        tier.set("b", Bytes::from("2"), ttl).await.unwrap();
        tier.get("a").await.unwrap();
        tier.set("c", Bytes::from("3"), ttl).await.unwrap();

        assert!(tier.get("a").await.unwrap().is_some());
        assert!(tier.get("b").await.unwrap().is_none());
        assert!(tier.get("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unrepresentable_ttl_skips_the_write() {
        let tier = tier(2);
        tier.set("a", Bytes::from("one"), Duration::MAX)
            .await
            .unwrap();

        assert!(tier.is_empty());
        assert!(tier.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let tier = tier(2);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = tier.entries.lock().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        tier.set("a", Bytes::from("1"), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(tier.get("a").await.unwrap().is_some());
    }
}
