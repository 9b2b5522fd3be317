//! Repository traits describing the corpus store adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::{ScanFragment, StructuredArgs};
use crate::domain::ItemId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// One row of a cursor scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRow {
    pub id: ItemId,
    /// Stable, strictly ordered key used as the scan cursor.
    pub surrogate_key: i64,
}

/// Read access to the content corpus.
#[async_trait]
pub trait CorpusRepo: Send + Sync {
    /// Count items matching structured filter args.
    async fn count(&self, args: &StructuredArgs) -> Result<u64, RepoError>;

    /// Return up to `limit` matching rows with `surrogate_key > cursor`, ascending by key.
    async fn scan(
        &self,
        fragment: &ScanFragment,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<ScanRow>, RepoError>;

    async fn key_exists(&self, id: ItemId, meta_key: &str) -> Result<bool, RepoError>;

    /// Drop non-essential per-batch caches held by the adapter. Best effort.
    async fn release_caches(&self) {}
}
