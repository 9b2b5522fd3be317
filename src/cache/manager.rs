//! Two-tier eligibility cache.
//!
//! Reads go to the fast tier first and fall back to the persistent tier, repopulating the fast
//! tier with whatever TTL the persistent entry has left. Tier failures degrade to a miss on read
//! and a skipped write on store; only invalidation reports them.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::domain::QueryDescriptor;

use super::config::CacheConfig;
use super::entry::{CacheEntry, CachedResult, ResultKind};
use super::error::CacheError;
use super::keys::derive_key;
use super::tier::CacheTier;
use super::version::VersionStore;

const METRIC_FAST_HIT_TOTAL: &str = "eligo_cache_fast_hit_total";
const METRIC_PERSISTENT_HIT_TOTAL: &str = "eligo_cache_persistent_hit_total";
const METRIC_MISS_TOTAL: &str = "eligo_cache_miss_total";
const METRIC_TIER_ERROR_TOTAL: &str = "eligo_cache_tier_error_total";
const METRIC_VERSION_BUMP_TOTAL: &str = "eligo_cache_version_bump_total";

/// Cache key pinned to the version current when a resolution started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSlot {
    key: String,
    kind: ResultKind,
}

impl CacheSlot {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }
}

pub struct CacheManager {
    config: CacheConfig,
    partition_id: String,
    fast: Arc<dyn CacheTier>,
    persistent: Arc<dyn CacheTier>,
    versions: Arc<dyn VersionStore>,
}

impl CacheManager {
    pub fn new(
        config: CacheConfig,
        partition_id: impl Into<String>,
        fast: Arc<dyn CacheTier>,
        persistent: Arc<dyn CacheTier>,
        versions: Arc<dyn VersionStore>,
    ) -> Self {
        Self {
            config,
            partition_id: partition_id.into(),
            fast,
            persistent,
            versions,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub async fn current_version(&self) -> Result<u64, CacheError> {
        self.versions.current().await
    }

    /// Key under which `kind` results for `descriptor` are stored at the current version.
    pub async fn cache_key(
        &self,
        descriptor: &QueryDescriptor,
        kind: ResultKind,
    ) -> Result<String, CacheError> {
        let version = self.versions.current().await?;
        Ok(derive_key(descriptor, kind, version, &self.partition_id))
    }

    /// Pin the key for one resolution at the current version.
    ///
    /// A result computed after [`CacheManager::slot`] must be stored through the same slot: a
    /// version bump during the computation then leaves the result under a key no later lookup
    /// derives. `None` when caching is disabled or the version cannot be read.
    pub async fn slot(&self, descriptor: &QueryDescriptor, kind: ResultKind) -> Option<CacheSlot> {
        if !self.config.enabled {
            return None;
        }

        match self.cache_key(descriptor, kind).await {
            Ok(key) => Some(CacheSlot { key, kind }),
            Err(err) => {
                self.record_error("version", "current", &err);
                None
            }
        }
    }

    /// Look up a cached result. Any failure is reported as a miss.
    pub async fn get(&self, descriptor: &QueryDescriptor, kind: ResultKind) -> Option<CachedResult> {
        self.lookup(descriptor, kind).await.1
    }

    /// Pin a slot and read it. The slot is returned for storing a freshly computed result.
    pub async fn lookup(
        &self,
        descriptor: &QueryDescriptor,
        kind: ResultKind,
    ) -> (Option<CacheSlot>, Option<CachedResult>) {
        match self.slot(descriptor, kind).await {
            Some(slot) => {
                let hit = self.get_at(&slot).await;
                (Some(slot), hit)
            }
            None => {
                if self.config.enabled {
                    counter!(METRIC_MISS_TOTAL).increment(1);
                }
                (None, None)
            }
        }
    }

    /// Look up the entry stored under a pinned slot.
    pub async fn get_at(&self, slot: &CacheSlot) -> Option<CachedResult> {
        let key = slot.key.as_str();

        if let Some(entry) = self.read_tier(self.fast.as_ref(), key, slot.kind).await {
            let now = OffsetDateTime::now_utc();
            if entry.remaining_ttl(now).is_some() {
                counter!(METRIC_FAST_HIT_TOTAL).increment(1);
                debug!(cache_key = %key, tier = self.fast.name(), "cache hit");
                return Some(entry.value);
            }
        }

        if let Some(entry) = self.read_tier(self.persistent.as_ref(), key, slot.kind).await {
            let now = OffsetDateTime::now_utc();
            if let Some(remaining) = entry.remaining_ttl(now) {
                self.repopulate_fast(key, &entry, remaining).await;
                counter!(METRIC_PERSISTENT_HIT_TOTAL).increment(1);
                debug!(
                    cache_key = %key,
                    tier = self.persistent.name(),
                    remaining_secs = remaining.as_secs(),
                    "cache hit"
                );
                return Some(entry.value);
            }
        }

        counter!(METRIC_MISS_TOTAL).increment(1);
        debug!(cache_key = %key, "cache miss");
        None
    }

    /// Store a result in both tiers at the current version. `ttl` overrides the computed TTL.
    pub async fn put(
        &self,
        descriptor: &QueryDescriptor,
        result: CachedResult,
        ttl: Option<Duration>,
    ) {
        if let Some(slot) = self.slot(descriptor, result.kind()).await {
            self.put_at(&slot, descriptor, result, ttl).await;
        }
    }

    /// Store a result under a slot pinned before it was computed.
    pub async fn put_at(
        &self,
        slot: &CacheSlot,
        descriptor: &QueryDescriptor,
        result: CachedResult,
        ttl: Option<Duration>,
    ) {
        if !self.config.enabled {
            return;
        }
        if result.kind() != slot.kind {
            warn!(
                cache_key = %slot.key,
                slot_kind = slot.kind.as_str(),
                result_kind = result.kind().as_str(),
                "result kind does not match its slot"
            );
            return;
        }

        let key = slot.key.clone();
        let ttl = ttl.unwrap_or_else(|| self.compute_ttl(descriptor, &result));
        let entry = CacheEntry::new(key.clone(), result, ttl);
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record_error("codec", "encode", &err);
                return;
            }
        };

        for tier in [&self.fast, &self.persistent] {
            if let Err(err) = tier.set(&key, bytes.clone(), ttl).await {
                self.record_error(tier.name(), "set", &err);
            }
        }

        debug!(cache_key = %key, ttl_secs = ttl.as_secs(), "cache store");
    }

    /// Pick a TTL from the request shape and the result size.
    pub fn compute_ttl(&self, descriptor: &QueryDescriptor, result: &CachedResult) -> Duration {
        let policy = &self.config.ttl;
        let size = result.size();

        if !descriptor.allow_recompute() {
            policy.closed_query
        } else if size > policy.large_result_threshold {
            policy.extended
        } else if size < policy.small_result_threshold {
            policy.short
        } else {
            policy.default
        }
    }

    /// Invalidate every entry by bumping the cache version.
    ///
    /// Expired entries are swept afterwards on a best-effort basis; a sweep failure does not
    /// affect the result.
    pub async fn clear_cache(&self) -> Result<u64, CacheError> {
        let version = self.versions.bump().await?;
        counter!(METRIC_VERSION_BUMP_TOTAL).increment(1);
        info!(version, partition_id = %self.partition_id, "cache version bumped");

        for tier in [&self.fast, &self.persistent] {
            match tier.sweep_expired().await {
                Ok(removed) => debug!(tier = tier.name(), removed, "expired entries swept"),
                Err(err) => self.record_error(tier.name(), "sweep_expired", &err),
            }
        }

        Ok(version)
    }

    async fn read_tier(
        &self,
        tier: &dyn CacheTier,
        key: &str,
        kind: ResultKind,
    ) -> Option<CacheEntry> {
        let bytes = match tier.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                self.record_error(tier.name(), "get", &err);
                return None;
            }
        };

        match CacheEntry::decode(&bytes) {
            Ok(entry) if entry.key == key && entry.value.kind() == kind => Some(entry),
            Ok(_) => {
                warn!(cache_key = %key, tier = tier.name(), "cache entry does not match its key");
                None
            }
            Err(err) => {
                self.record_error(tier.name(), "decode", &err);
                None
            }
        }
    }

    async fn repopulate_fast(&self, key: &str, entry: &CacheEntry, remaining: Duration) {
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record_error("codec", "encode", &err);
                return;
            }
        };
        if let Err(err) = self.fast.set(key, bytes, remaining).await {
            self.record_error(self.fast.name(), "set", &err);
        }
    }

    fn record_error(&self, tier: &'static str, op: &'static str, err: &CacheError) {
        counter!(METRIC_TIER_ERROR_TOTAL, "tier" => tier, "op" => op).increment(1);
        warn!(tier, op, error = %err, "cache operation failed");
    }
}
