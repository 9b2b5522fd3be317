//! Configuration layer: typed settings with layered precedence (file → explicit file → env).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::Path,
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::batch::{
    DEFAULT_BASE_BATCH_SIZE, DEFAULT_CRITICAL_MEMORY_PCT, DEFAULT_MAX_ITEMS,
    DEFAULT_MEMORY_CEILING_BYTES, DEFAULT_MIN_BATCH_SIZE, DEFAULT_RELEASE_EVERY,
    DEFAULT_TIME_BUDGET_FRACTION, DEFAULT_TIME_BUDGET_SECS,
};
use crate::cache::config::{
    DEFAULT_CLOSED_QUERY_TTL_SECS, DEFAULT_EXTENDED_TTL_SECS, DEFAULT_FAST_TIER_CAPACITY,
    DEFAULT_LARGE_RESULT_THRESHOLD, DEFAULT_SHORT_TTL_SECS, DEFAULT_SMALL_RESULT_THRESHOLD,
    DEFAULT_TTL_SECS,
};
use crate::domain::SettingsProvider;
use crate::domain::types::{ANY_STATUS, DEFAULT_CONTENT_TYPE};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "eligo";
const ENV_PREFIX: &str = "ELIGO";
const DEFAULT_PARTITION_ID: &str = "default";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;

/// Fully-resolved engine settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Separates cache entries of corpora that share a persistent tier.
    pub partition_id: String,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub engine: EngineSettings,
    pub cache: CacheSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Host defaults for descriptors built without an explicit content type or status.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_content_type: String,
    pub default_status: String,
}

impl SettingsProvider for EngineSettings {
    fn default_content_type(&self) -> String {
        self.default_content_type.clone()
    }

    fn default_status(&self) -> String {
        self.default_status.clone()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub fast_tier_capacity: NonZeroUsize,
    pub closed_query_ttl: Duration,
    pub extended_ttl: Duration,
    pub short_ttl: Duration,
    pub default_ttl: Duration,
    pub large_result_threshold: u64,
    pub small_result_threshold: u64,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub base_batch_size: NonZeroUsize,
    pub min_batch_size: NonZeroUsize,
    pub memory_ceiling_bytes: NonZeroU64,
    pub time_budget: Duration,
    pub time_budget_fraction: f64,
    pub critical_memory_pct: f64,
    pub max_items: NonZeroU64,
    pub release_every: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (default file → local file → explicit file →
/// `ELIGO__*` environment).
pub fn load(config_file: Option<&Path>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    partition_id: Option<String>,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    engine: RawEngineSettings,
    cache: RawCacheSettings,
    batch: RawBatchSettings,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            partition_id,
            logging,
            database,
            engine,
            cache,
            batch,
        } = raw;

        let partition_id = match partition_id {
            Some(value) if value.trim().is_empty() => {
                return Err(LoadError::invalid("partition_id", "must not be empty"));
            }
            Some(value) => value.trim().to_string(),
            None => DEFAULT_PARTITION_ID.to_string(),
        };

        Ok(Self {
            partition_id,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            engine: build_engine_settings(engine),
            cache: build_cache_settings(cache)?,
            batch: build_batch_settings(batch)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_engine_settings(engine: RawEngineSettings) -> EngineSettings {
    let non_blank = |value: Option<String>, fallback: &str| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    };

    EngineSettings {
        default_content_type: non_blank(engine.default_content_type, DEFAULT_CONTENT_TYPE),
        default_status: non_blank(engine.default_status, ANY_STATUS),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let fast_tier_capacity = non_zero_usize(
        cache
            .fast_tier_capacity
            .unwrap_or(DEFAULT_FAST_TIER_CAPACITY as u64),
        "cache.fast_tier_capacity",
    )?;

    let closed_query_ttl = ttl(
        cache.closed_query_ttl_secs,
        DEFAULT_CLOSED_QUERY_TTL_SECS,
        "cache.closed_query_ttl_secs",
    )?;
    let extended_ttl = ttl(
        cache.extended_ttl_secs,
        DEFAULT_EXTENDED_TTL_SECS,
        "cache.extended_ttl_secs",
    )?;
    let short_ttl = ttl(
        cache.short_ttl_secs,
        DEFAULT_SHORT_TTL_SECS,
        "cache.short_ttl_secs",
    )?;
    let default_ttl = ttl(
        cache.default_ttl_secs,
        DEFAULT_TTL_SECS,
        "cache.default_ttl_secs",
    )?;

    let large_result_threshold = cache
        .large_result_threshold
        .unwrap_or(DEFAULT_LARGE_RESULT_THRESHOLD);
    let small_result_threshold = cache
        .small_result_threshold
        .unwrap_or(DEFAULT_SMALL_RESULT_THRESHOLD);
    if small_result_threshold > large_result_threshold {
        return Err(LoadError::invalid(
            "cache.small_result_threshold",
            "must not exceed cache.large_result_threshold",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        fast_tier_capacity,
        closed_query_ttl,
        extended_ttl,
        short_ttl,
        default_ttl,
        large_result_threshold,
        small_result_threshold,
    })
}

fn build_batch_settings(batch: RawBatchSettings) -> Result<BatchSettings, LoadError> {
    let base_batch_size = non_zero_usize(
        batch.base_batch_size.unwrap_or(DEFAULT_BASE_BATCH_SIZE as u64),
        "batch.base_batch_size",
    )?;
    let min_batch_size = non_zero_usize(
        batch.min_batch_size.unwrap_or(DEFAULT_MIN_BATCH_SIZE as u64),
        "batch.min_batch_size",
    )?;
    if min_batch_size > base_batch_size {
        return Err(LoadError::invalid(
            "batch.min_batch_size",
            "must not exceed batch.base_batch_size",
        ));
    }

    let memory_ceiling_bytes = NonZeroU64::new(
        batch
            .memory_ceiling_bytes
            .unwrap_or(DEFAULT_MEMORY_CEILING_BYTES),
    )
    .ok_or_else(|| LoadError::invalid("batch.memory_ceiling_bytes", "must be greater than zero"))?;

    let time_budget_secs = batch.time_budget_secs.unwrap_or(DEFAULT_TIME_BUDGET_SECS);
    if time_budget_secs == 0 {
        return Err(LoadError::invalid(
            "batch.time_budget_secs",
            "must be greater than zero",
        ));
    }

    let time_budget_fraction = batch
        .time_budget_fraction
        .unwrap_or(DEFAULT_TIME_BUDGET_FRACTION);
    if !(time_budget_fraction > 0.0 && time_budget_fraction <= 1.0) {
        return Err(LoadError::invalid(
            "batch.time_budget_fraction",
            "must be within (0, 1]",
        ));
    }

    let critical_memory_pct = batch
        .critical_memory_pct
        .unwrap_or(DEFAULT_CRITICAL_MEMORY_PCT);
    if !(critical_memory_pct > 0.0 && critical_memory_pct <= 100.0) {
        return Err(LoadError::invalid(
            "batch.critical_memory_pct",
            "must be within (0, 100]",
        ));
    }

    let max_items = NonZeroU64::new(batch.max_items.unwrap_or(DEFAULT_MAX_ITEMS))
        .ok_or_else(|| LoadError::invalid("batch.max_items", "must be greater than zero"))?;
    let release_every = non_zero_u32(
        batch.release_every.unwrap_or(u64::from(DEFAULT_RELEASE_EVERY)),
        "batch.release_every",
    )?;

    Ok(BatchSettings {
        base_batch_size,
        min_batch_size,
        memory_ceiling_bytes,
        time_budget: Duration::from_secs(time_budget_secs),
        time_budget_fraction,
        critical_memory_pct,
        max_items,
        release_every,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    default_content_type: Option<String>,
    default_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    fast_tier_capacity: Option<u64>,
    closed_query_ttl_secs: Option<u64>,
    extended_ttl_secs: Option<u64>,
    short_ttl_secs: Option<u64>,
    default_ttl_secs: Option<u64>,
    large_result_threshold: Option<u64>,
    small_result_threshold: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBatchSettings {
    base_batch_size: Option<u64>,
    min_batch_size: Option<u64>,
    memory_ceiling_bytes: Option<u64>,
    time_budget_secs: Option<u64>,
    time_budget_fraction: Option<f64>,
    critical_memory_pct: Option<f64>,
    max_items: Option<u64>,
    release_every: Option<u64>,
}

fn ttl(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    let secs = value.unwrap_or(default);
    if secs == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
