//! Wiring of the eligibility service from resolved settings.

use std::sync::Arc;

use tracing::info;

use crate::application::batch::{BatchConfig, BatchProcessor};
use crate::application::eligibility::EligibilityService;
use crate::application::repos::CorpusRepo;
use crate::cache::{AtomicVersion, CacheConfig, CacheManager, CacheTier, LruTier, VersionStore};
use crate::config::Settings;

use super::db::PostgresRepositories;
use super::error::InfraError;
use super::memory::ProcessMemory;

/// Assemble a service from explicit adapters.
pub fn build_service(
    settings: &Settings,
    corpus: Arc<dyn CorpusRepo>,
    persistent: Arc<dyn CacheTier>,
    versions: Arc<dyn VersionStore>,
) -> EligibilityService {
    let cache_config = CacheConfig::from(&settings.cache);
    let fast: Arc<dyn CacheTier> = Arc::new(LruTier::new(&cache_config));
    let cache = Arc::new(CacheManager::new(
        cache_config,
        settings.partition_id.clone(),
        fast,
        persistent,
        versions,
    ));

    let batches = Arc::new(BatchProcessor::new(
        BatchConfig::from(&settings.batch),
        corpus.clone(),
        Arc::new(ProcessMemory),
    ));

    EligibilityService::new(corpus, cache, batches)
}

/// Service over an in-process corpus; both cache tiers and the version live in memory.
pub fn build_in_memory_service(
    settings: &Settings,
    corpus: Arc<dyn CorpusRepo>,
) -> EligibilityService {
    let persistent: Arc<dyn CacheTier> =
        Arc::new(LruTier::new(&CacheConfig::from(&settings.cache)));
    build_service(
        settings,
        corpus,
        persistent,
        Arc::new(AtomicVersion::default()),
    )
}

/// Connect to Postgres, apply migrations and assemble a service on top of it.
pub async fn build_postgres_service(settings: &Settings) -> Result<EligibilityService, InfraError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await?;
    PostgresRepositories::run_migrations(&pool).await?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    repositories.health_check().await?;

    info!(
        partition_id = %settings.partition_id,
        cache_enabled = settings.cache.enabled,
        "Eligibility service connected"
    );

    let persistent: Arc<dyn CacheTier> = Arc::new(repositories.cache_tier());
    let versions: Arc<dyn VersionStore> = Arc::new(repositories.version_store());
    Ok(build_service(settings, repositories, persistent, versions))
}
