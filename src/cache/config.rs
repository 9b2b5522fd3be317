//! Cache configuration.
//!
//! Controls the tiered eligibility cache and its TTL heuristic.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration, shared with the settings loader
pub(crate) const DEFAULT_FAST_TIER_CAPACITY: usize = 1024;
pub(crate) const DEFAULT_CLOSED_QUERY_TTL_SECS: u64 = 6 * 60 * 60;
pub(crate) const DEFAULT_EXTENDED_TTL_SECS: u64 = 2 * 60 * 60;
pub(crate) const DEFAULT_SHORT_TTL_SECS: u64 = 5 * 60;
pub(crate) const DEFAULT_TTL_SECS: u64 = 30 * 60;
pub(crate) const DEFAULT_LARGE_RESULT_THRESHOLD: u64 = 1000;
pub(crate) const DEFAULT_SMALL_RESULT_THRESHOLD: u64 = 50;

/// TTL tiers picked by the cache manager based on the request and the result size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    /// Requests that exclude already-processed items.
    pub closed_query: Duration,
    /// Results larger than `large_result_threshold`.
    pub extended: Duration,
    /// Results smaller than `small_result_threshold`.
    pub short: Duration,
    pub default: Duration,
    pub large_result_threshold: u64,
    pub small_result_threshold: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            closed_query: Duration::from_secs(DEFAULT_CLOSED_QUERY_TTL_SECS),
            extended: Duration::from_secs(DEFAULT_EXTENDED_TTL_SECS),
            short: Duration::from_secs(DEFAULT_SHORT_TTL_SECS),
            default: Duration::from_secs(DEFAULT_TTL_SECS),
            large_result_threshold: DEFAULT_LARGE_RESULT_THRESHOLD,
            small_result_threshold: DEFAULT_SMALL_RESULT_THRESHOLD,
        }
    }
}

/// Cache configuration from `eligo.toml`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup misses and every write is skipped.
    pub enabled: bool,
    /// Maximum entries held by the in-process fast tier.
    pub fast_tier_capacity: usize,
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fast_tier_capacity: DEFAULT_FAST_TIER_CAPACITY,
            ttl: TtlPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            fast_tier_capacity: settings.fast_tier_capacity.get(),
            ttl: TtlPolicy {
                closed_query: settings.closed_query_ttl,
                extended: settings.extended_ttl,
                short: settings.short_ttl,
                default: settings.default_ttl,
                large_result_threshold: settings.large_result_threshold,
                small_result_threshold: settings.small_result_threshold,
            },
        }
    }
}

impl CacheConfig {
    /// Returns the fast tier capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn fast_tier_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.fast_tier_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.fast_tier_capacity, 1024);
        assert_eq!(config.ttl.closed_query, Duration::from_secs(21_600));
        assert_eq!(config.ttl.extended, Duration::from_secs(7_200));
        assert_eq!(config.ttl.short, Duration::from_secs(300));
        assert_eq!(config.ttl.default, Duration::from_secs(1_800));
        assert_eq!(config.ttl.large_result_threshold, 1000);
        assert_eq!(config.ttl.small_result_threshold, 50);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            fast_tier_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.fast_tier_capacity_non_zero().get(), 1);
    }
}
