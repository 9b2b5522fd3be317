use thiserror::Error;

/// Failure of a cache tier or of the version counter.
///
/// Reads and writes recover from these locally; only version bumps surface them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache tier `{tier}` unavailable: {message}")]
    Unavailable { tier: &'static str, message: String },
    #[error("cache entry could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CacheError {
    pub fn unavailable(tier: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            tier,
            message: err.to_string(),
        }
    }
}
