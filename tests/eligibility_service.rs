//! End-to-end resolution through the service over the in-memory corpus.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use eligo::application::batch::{BatchConfig, BatchProcessor, MemoryProbe};
use eligo::application::eligibility::EligibilityService;
use eligo::application::error::EngineError;
use eligo::application::query::{ScanFragment, StructuredArgs};
use eligo::application::repos::{CorpusRepo, RepoError, ScanRow};
use eligo::cache::{
    AtomicVersion, CacheConfig, CacheError, CacheManager, CacheTier, CachedResult, LruTier,
};
use eligo::domain::{ItemId, QueryDescriptor, Workflow};
use eligo::infra::corpus::{ContentItem, InMemoryCorpus};

const ITEM_A: ItemId = 1;
const ITEM_B: ItemId = 2;
const ITEM_C: ItemId = 3;

struct NoPressure;

impl MemoryProbe for NoPressure {
    fn resident_bytes(&self) -> Option<u64> {
        Some(0)
    }
}

struct FailingTier;

#[async_trait]
impl CacheTier for FailingTier {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::unavailable("failing", "connection reset"))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::unavailable("failing", "connection reset"))
    }
}

struct UnreachableCorpus;

#[async_trait]
impl CorpusRepo for UnreachableCorpus {
    async fn count(&self, _args: &StructuredArgs) -> Result<u64, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn scan(
        &self,
        _fragment: &ScanFragment,
        _cursor: i64,
        _limit: usize,
    ) -> Result<Vec<ScanRow>, RepoError> {
        Err(RepoError::from_persistence("connection refused"))
    }

    async fn key_exists(&self, _id: ItemId, _meta_key: &str) -> Result<bool, RepoError> {
        Err(RepoError::Timeout)
    }
}

/// Marks item A as summarized and clears the cache while the first scan is in flight.
struct InvalidatingCorpus {
    inner: Arc<InMemoryCorpus>,
    cache: Arc<CacheManager>,
    fired: AtomicBool,
}

#[async_trait]
impl CorpusRepo for InvalidatingCorpus {
    async fn count(&self, args: &StructuredArgs) -> Result<u64, RepoError> {
        self.inner.count(args).await
    }

    async fn scan(
        &self,
        fragment: &ScanFragment,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<ScanRow>, RepoError> {
        let rows = self.inner.scan(fragment, cursor, limit).await?;
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.set_meta(ITEM_A, "_eligo_summary", "done");
            self.cache.clear_cache().await.expect("clear cache");
        }
        Ok(rows)
    }

    async fn key_exists(&self, id: ItemId, meta_key: &str) -> Result<bool, RepoError> {
        self.inner.key_exists(id, meta_key).await
    }
}

/// A: untouched, B: already has the summary, C: summary protected.
fn scenario_corpus() -> Arc<InMemoryCorpus> {
    Arc::new(InMemoryCorpus::from_items([
        ContentItem::new(ITEM_A, "post", "published"),
        ContentItem::new(ITEM_B, "post", "published").with_meta("_eligo_summary", "done"),
        ContentItem::new(ITEM_C, "post", "published").with_meta("_eligo_summary_protected", "1"),
    ]))
}

fn service_with(
    corpus: Arc<dyn CorpusRepo>,
    cache_config: CacheConfig,
    fast: Arc<dyn CacheTier>,
    persistent: Arc<dyn CacheTier>,
) -> EligibilityService {
    let cache = Arc::new(CacheManager::new(
        cache_config,
        "test-partition",
        fast,
        persistent,
        Arc::new(AtomicVersion::default()),
    ));
    let batches = Arc::new(BatchProcessor::new(
        BatchConfig::default(),
        corpus.clone(),
        Arc::new(NoPressure),
    ));
    EligibilityService::new(corpus, cache, batches)
}

fn service(corpus: Arc<dyn CorpusRepo>) -> EligibilityService {
    let config = CacheConfig::default();
    service_with(
        corpus,
        config.clone(),
        Arc::new(LruTier::new(&config)),
        Arc::new(LruTier::new(&config)),
    )
}

fn summary(allow_recompute: bool, allow_override_protected: bool) -> QueryDescriptor {
    QueryDescriptor::new("post", Workflow::Summary)
        .allowing_recompute(allow_recompute)
        .allowing_protected_override(allow_override_protected)
}

#[tokio::test]
async fn safety_filters_select_expected_items() {
    let service = service(scenario_corpus());

    let cases = [
        (summary(false, false), vec![ITEM_A]),
        (summary(true, false), vec![ITEM_A, ITEM_B]),
        (summary(false, true), vec![ITEM_A, ITEM_C]),
        (summary(true, true), vec![ITEM_A, ITEM_B, ITEM_C]),
    ];

    for (descriptor, expected) in cases {
        let resolved = service.resolve_ids(&descriptor).await.expect("resolve ids");
        assert!(resolved.complete);
        assert_eq!(resolved.ids, expected, "descriptor: {descriptor:?}");

        let count = service.resolve_count(&descriptor).await.expect("resolve count");
        assert_eq!(count, expected.len() as u64, "descriptor: {descriptor:?}");
    }
}

#[tokio::test]
async fn repeated_requests_are_served_from_cache() {
    let corpus = scenario_corpus();
    let service = service(corpus.clone());
    let descriptor = summary(true, false);

    assert_eq!(service.resolve_count(&descriptor).await.unwrap(), 2);
    assert_eq!(service.resolve_count(&descriptor).await.unwrap(), 2);
    assert_eq!(corpus.count_calls(), 1);

    let first = service.resolve_ids(&descriptor).await.unwrap();
    let scans = corpus.scan_calls();
    let second = service.resolve_ids(&descriptor).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(corpus.scan_calls(), scans);
}

#[tokio::test]
async fn invalidation_exposes_corpus_changes() {
    let corpus = scenario_corpus();
    let service = service(corpus.clone());
    let descriptor = summary(false, false);

    assert_eq!(service.resolve_ids(&descriptor).await.unwrap().ids, vec![ITEM_A]);

    assert!(corpus.set_meta(ITEM_A, "_eligo_summary", "done"));
    assert_eq!(
        service.resolve_ids(&descriptor).await.unwrap().ids,
        vec![ITEM_A],
        "stale entry is served until invalidated"
    );

    let before = service.cache().current_version().await.unwrap();
    let version = service.invalidate_all().await.expect("invalidate");
    assert_eq!(version, before + 1);

    assert!(service.resolve_ids(&descriptor).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalidation_during_scan_is_not_masked_by_its_result() {
    let inner = scenario_corpus();
    let config = CacheConfig::default();
    let cache = Arc::new(CacheManager::new(
        config.clone(),
        "test-partition",
        Arc::new(LruTier::new(&config)),
        Arc::new(LruTier::new(&config)),
        Arc::new(AtomicVersion::default()),
    ));
    let corpus: Arc<dyn CorpusRepo> = Arc::new(InvalidatingCorpus {
        inner: inner.clone(),
        cache: cache.clone(),
        fired: AtomicBool::new(false),
    });
    let batches = Arc::new(BatchProcessor::new(
        BatchConfig::default(),
        corpus.clone(),
        Arc::new(NoPressure),
    ));
    let service = EligibilityService::new(corpus, cache, batches);
    let descriptor = summary(false, false);

    let first = service.resolve_ids(&descriptor).await.expect("first resolve");
    assert_eq!(first.ids, vec![ITEM_A]);

    let scans = inner.scan_calls();
    let second = service.resolve_ids(&descriptor).await.expect("second resolve");
    assert!(second.is_empty());
    assert!(inner.scan_calls() > scans);
}

#[tokio::test]
async fn artifact_recheck_bypasses_cache() {
    let corpus = scenario_corpus();
    let service = service(corpus.clone());

    assert!(!service.has_artifact(ITEM_A, Workflow::Summary).await.unwrap());
    assert!(service.has_artifact(ITEM_B, Workflow::Summary).await.unwrap());
    assert!(!service.has_artifact(ITEM_B, Workflow::Metadata).await.unwrap());

    corpus.set_meta(ITEM_A, "_eligo_summary", "done");
    assert!(service.has_artifact(ITEM_A, Workflow::Summary).await.unwrap());
}

#[tokio::test]
async fn disabled_cache_always_reads_the_corpus() {
    let corpus = scenario_corpus();
    let config = CacheConfig {
        enabled: false,
        ..Default::default()
    };
    let service = service_with(
        corpus.clone(),
        config.clone(),
        Arc::new(LruTier::new(&config)),
        Arc::new(LruTier::new(&config)),
    );
    let descriptor = summary(false, false);

    for _ in 0..3 {
        assert_eq!(service.resolve_count(&descriptor).await.unwrap(), 1);
    }
    assert_eq!(corpus.count_calls(), 3);
}

#[tokio::test]
async fn failing_tiers_do_not_fail_resolution() {
    let corpus = scenario_corpus();
    let service = service_with(
        corpus.clone(),
        CacheConfig::default(),
        Arc::new(FailingTier),
        Arc::new(FailingTier),
    );
    let descriptor = summary(true, true);

    let resolved = service.resolve_ids(&descriptor).await.expect("resolve ids");
    assert_eq!(resolved.ids, vec![ITEM_A, ITEM_B, ITEM_C]);
    assert_eq!(service.resolve_count(&descriptor).await.unwrap(), 3);
    assert_eq!(service.resolve_count(&descriptor).await.unwrap(), 3);
    assert_eq!(corpus.count_calls(), 2);
}

#[tokio::test]
async fn data_access_errors_propagate() {
    let service = service(Arc::new(UnreachableCorpus));
    let descriptor = summary(false, false);

    let err = service.resolve_count(&descriptor).await.expect_err("count fails");
    assert!(matches!(err, EngineError::DataAccess(RepoError::Timeout)));

    let err = service.resolve_ids(&descriptor).await.expect_err("scan fails");
    assert!(matches!(err, EngineError::DataAccess(RepoError::Persistence(_))));

    let err = service
        .has_artifact(ITEM_A, Workflow::Summary)
        .await
        .expect_err("probe fails");
    assert!(matches!(err, EngineError::DataAccess(_)));
}

#[tokio::test]
async fn count_and_id_results_use_separate_slots() {
    let service = service(scenario_corpus());
    let descriptor = summary(true, true);

    service.resolve_count(&descriptor).await.unwrap();
    service.resolve_ids(&descriptor).await.unwrap();

    let cache = service.cache();
    assert_eq!(
        cache.get(&descriptor, eligo::cache::ResultKind::Count).await,
        Some(CachedResult::Count { count: 3 })
    );
    assert_eq!(
        cache.get(&descriptor, eligo::cache::ResultKind::Ids).await,
        Some(CachedResult::Ids {
            ids: vec![ITEM_A, ITEM_B, ITEM_C]
        })
    );
}

#[tokio::test]
async fn ttl_follows_request_shape_and_size() {
    let service = service(scenario_corpus());
    let cache = service.cache();
    let count = |n| CachedResult::Count { count: n };

    assert_eq!(
        cache.compute_ttl(&summary(false, true), &count(500)),
        Duration::from_secs(6 * 60 * 60)
    );
    assert_eq!(
        cache.compute_ttl(&summary(true, true), &count(10)),
        Duration::from_secs(5 * 60)
    );
    assert_eq!(
        cache.compute_ttl(&summary(true, true), &count(2_000)),
        Duration::from_secs(2 * 60 * 60)
    );
    assert_eq!(
        cache.compute_ttl(&summary(true, true), &count(500)),
        Duration::from_secs(30 * 60)
    );
}
