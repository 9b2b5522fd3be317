//! Eligo Cache System
//!
//! Two-tier cache for resolved eligibility results:
//!
//! - **Fast tier**: bounded in-process LRU ([`LruTier`])
//! - **Persistent tier**: shared store that survives restarts (see `infra::db::cache`)
//!
//! Entries are keyed by a digest of the query descriptor, the cache version and the partition
//! id. Invalidation bumps the version; stale entries are never read again and age out by TTL.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! fast_tier_capacity = 1024
//! default_ttl_secs = 1800
//! # ... see config.rs for all options
//! ```

pub(crate) mod config;
mod entry;
mod error;
mod keys;
pub(crate) mod lock;
mod manager;
mod tier;
mod version;

pub use config::{CacheConfig, TtlPolicy};
pub use entry::{CachedResult, ResultKind};
pub use error::CacheError;
pub use keys::derive_key;
pub use manager::{CacheManager, CacheSlot};
pub use tier::{CacheTier, LruTier};
pub use version::{AtomicVersion, VersionStore};
