//! Cached resolution results and their stored envelope.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::ItemId;

use super::error::CacheError;

/// Which resolution a cache slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Ids,
    Count,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Ids => "ids",
            ResultKind::Count => "count",
        }
    }
}

/// Value stored for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedResult {
    Ids { ids: Vec<ItemId> },
    Count { count: u64 },
}

impl CachedResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            CachedResult::Ids { .. } => ResultKind::Ids,
            CachedResult::Count { .. } => ResultKind::Count,
        }
    }

    /// Number of eligible items the result describes.
    pub fn size(&self) -> u64 {
        match self {
            CachedResult::Ids { ids } => ids.len() as u64,
            CachedResult::Count { count } => *count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    pub key: String,
    pub value: CachedResult,
    pub stored_at: OffsetDateTime,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(key: String, value: CachedResult, ttl: Duration) -> Self {
        Self {
            key,
            value,
            stored_at: OffsetDateTime::now_utc(),
            ttl_secs: ttl.as_secs(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, CacheError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Time left before the entry expires, or `None` once it has.
    pub fn remaining_ttl(&self, now: OffsetDateTime) -> Option<Duration> {
        let ttl = i64::try_from(self.ttl_secs).ok()?;
        let expires_at = self.stored_at.checked_add(time::Duration::seconds(ttl))?;
        let left = expires_at - now;
        if left.is_positive() {
            Duration::try_from(left).ok()
        } else {
            None
        }
    }
}
