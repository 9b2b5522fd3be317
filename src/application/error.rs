use std::error::Error as StdError;

use thiserror::Error;

use crate::application::repos::RepoError;
use crate::cache::CacheError;

/// Flattened error chain attached to failure logs.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

/// Failure surfaced by the eligibility service.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data access failed")]
    DataAccess(#[from] RepoError),
    #[error("cache operation failed")]
    Cache(#[from] CacheError),
}
