//! Cache version counter.
//!
//! Every key embeds the current version, so bumping it invalidates all entries at once without
//! enumerating them.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::error::CacheError;

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn current(&self) -> Result<u64, CacheError>;

    /// Increment the version and return the new value.
    async fn bump(&self) -> Result<u64, CacheError>;
}

/// Process-local version counter.
#[derive(Debug)]
pub struct AtomicVersion {
    value: AtomicU64,
}

impl AtomicVersion {
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }
}

impl Default for AtomicVersion {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl VersionStore for AtomicVersion {
    async fn current(&self) -> Result<u64, CacheError> {
        Ok(self.value.load(Ordering::Acquire))
    }

    async fn bump(&self) -> Result<u64, CacheError> {
        Ok(self.value.fetch_add(1, Ordering::AcqRel) + 1)
    }
}
