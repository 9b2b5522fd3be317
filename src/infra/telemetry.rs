use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Safe to call repeatedly.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "eligo_cache_fast_hit_total",
            Unit::Count,
            "Total number of eligibility lookups served by the fast cache tier."
        );
        describe_counter!(
            "eligo_cache_persistent_hit_total",
            Unit::Count,
            "Total number of eligibility lookups served by the persistent cache tier."
        );
        describe_counter!(
            "eligo_cache_miss_total",
            Unit::Count,
            "Total number of eligibility lookups that missed both cache tiers."
        );
        describe_counter!(
            "eligo_cache_tier_error_total",
            Unit::Count,
            "Total number of cache tier operations that failed and were recovered."
        );
        describe_counter!(
            "eligo_cache_version_bump_total",
            Unit::Count,
            "Total number of cache version bumps."
        );
        describe_counter!(
            "eligo_batch_fetch_total",
            Unit::Count,
            "Total number of corpus batches fetched by cursor scans."
        );
        describe_counter!(
            "eligo_batch_partial_total",
            Unit::Count,
            "Total number of scans stopped early by a resource guard."
        );
        describe_histogram!(
            "eligo_resolve_ms",
            Unit::Milliseconds,
            "Eligibility resolution latency in milliseconds."
        );
    });
}
