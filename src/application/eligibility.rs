//! Eligibility resolution entry points.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{error, info, instrument};

use crate::application::batch::BatchProcessor;
use crate::application::error::{EngineError, ErrorReport};
use crate::application::query::{build_scan_fragment, build_structured_args};
use crate::application::repos::{CorpusRepo, RepoError};
use crate::cache::{CacheManager, CachedResult, ResultKind};
use crate::domain::{ItemId, QueryDescriptor, Workflow};

const SOURCE: &str = "application::eligibility::EligibilityService";
const METRIC_RESOLVE_MS: &str = "eligo_resolve_ms";

/// Ids that satisfy a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleIds {
    /// Ascending by surrogate key, without duplicates.
    pub ids: Vec<ItemId>,
    /// False when a resource guard stopped the scan; `ids` is then a prefix of the full set.
    pub complete: bool,
}

impl EligibleIds {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Human readable size, e.g. `"42"` or `"at least 400"` for partial results.
    pub fn count_label(&self) -> String {
        if self.complete {
            self.ids.len().to_string()
        } else {
            format!("at least {}", self.ids.len())
        }
    }
}

#[derive(Clone)]
pub struct EligibilityService {
    corpus: Arc<dyn CorpusRepo>,
    cache: Arc<CacheManager>,
    batches: Arc<BatchProcessor>,
}

impl EligibilityService {
    pub fn new(
        corpus: Arc<dyn CorpusRepo>,
        cache: Arc<CacheManager>,
        batches: Arc<BatchProcessor>,
    ) -> Self {
        Self {
            corpus,
            cache,
            batches,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Number of items matching `descriptor`.
    #[instrument(skip(self), fields(workflow = descriptor.workflow().as_str()))]
    pub async fn resolve_count(&self, descriptor: &QueryDescriptor) -> Result<u64, EngineError> {
        let started_at = Instant::now();

        let (slot, cached) = self.cache.lookup(descriptor, ResultKind::Count).await;
        if let Some(CachedResult::Count { count }) = cached {
            record_latency("count", "cache", started_at);
            return Ok(count);
        }

        let args = build_structured_args(descriptor);
        let count = self
            .corpus
            .count(&args)
            .await
            .map_err(|err| repo_failure("count", err))?;

        if let Some(slot) = slot.as_ref() {
            self.cache
                .put_at(slot, descriptor, CachedResult::Count { count }, None)
                .await;
        }
        record_latency("count", "corpus", started_at);

        Ok(count)
    }

    /// Ids of every item matching `descriptor`, subject to the batch guards.
    ///
    /// Only complete results are cached, under the key pinned before the scan started.
    #[instrument(skip(self), fields(workflow = descriptor.workflow().as_str()))]
    pub async fn resolve_ids(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<EligibleIds, EngineError> {
        let started_at = Instant::now();

        let (slot, cached) = self.cache.lookup(descriptor, ResultKind::Ids).await;
        if let Some(CachedResult::Ids { ids }) = cached {
            record_latency("ids", "cache", started_at);
            return Ok(EligibleIds {
                ids,
                complete: true,
            });
        }

        let fragment = build_scan_fragment(descriptor);
        let outcome = self
            .batches
            .run(&fragment)
            .await
            .map_err(|err| repo_failure("scan", err))?;

        let complete = outcome.is_complete();
        if !complete {
            info!(
                stop_reason = outcome.stop_reason.as_str(),
                collected = outcome.ids.len(),
                "Partial result not cached"
            );
        } else if let Some(slot) = slot.as_ref() {
            self.cache
                .put_at(
                    slot,
                    descriptor,
                    CachedResult::Ids {
                        ids: outcome.ids.clone(),
                    },
                    None,
                )
                .await;
        }
        record_latency("ids", "corpus", started_at);

        Ok(EligibleIds {
            ids: outcome.ids,
            complete,
        })
    }

    /// Drop every cached result. Returns the new cache version.
    #[instrument(skip(self))]
    pub async fn invalidate_all(&self) -> Result<u64, EngineError> {
        let version = self.cache.clear_cache().await.map_err(|err| {
            let err = EngineError::from(err);
            let report = ErrorReport::from_error(SOURCE, &err);
            error!(source = report.source, messages = ?report.messages, "Cache invalidation failed");
            err
        })?;
        Ok(version)
    }

    /// Whether `id` already carries the artifact for `workflow`, bypassing the cache.
    ///
    /// Used right before generating an artifact for an id taken from a cached list.
    #[instrument(skip(self))]
    pub async fn has_artifact(&self, id: ItemId, workflow: Workflow) -> Result<bool, EngineError> {
        self.corpus
            .key_exists(id, workflow.artifact_meta_key())
            .await
            .map_err(|err| repo_failure("key_exists", err))
    }
}

fn record_latency(op: &'static str, source: &'static str, started_at: Instant) {
    histogram!(METRIC_RESOLVE_MS, "op" => op, "source" => source)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
}

fn repo_failure(operation: &'static str, err: RepoError) -> EngineError {
    let err = EngineError::from(err);
    let report = ErrorReport::from_error(SOURCE, &err);
    error!(
        source = report.source,
        operation,
        messages = ?report.messages,
        "Corpus access failed"
    );
    err
}
