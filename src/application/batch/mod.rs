//! Adaptive cursor scan over the corpus.
//!
//! A single resolution walks the corpus in ascending surrogate-key order, shrinking its batch
//! size as memory fills up and stopping early when a guard condition trips. Stopping early is a
//! normal outcome and is reported through [`StopReason`], never as an error.

mod policy;
mod probe;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::{debug, error, info, instrument};

use crate::application::query::ScanFragment;
use crate::application::repos::{CorpusRepo, RepoError, ScanRow};
use crate::domain::ItemId;

pub use policy::{BatchSizePolicy, PressureTier, TieredBatchPolicy};
pub use probe::{Clock, MemoryProbe, SystemClock};

const METRIC_BATCH_FETCH_TOTAL: &str = "eligo_batch_fetch_total";
const METRIC_BATCH_PARTIAL_TOTAL: &str = "eligo_batch_partial_total";

// Default values for batch configuration, shared with the settings loader
pub(crate) const DEFAULT_BASE_BATCH_SIZE: usize = 200;
pub(crate) const DEFAULT_MIN_BATCH_SIZE: usize = 25;
pub(crate) const DEFAULT_MEMORY_CEILING_BYTES: u64 = 256 * 1024 * 1024;
pub(crate) const DEFAULT_TIME_BUDGET_SECS: u64 = 30;
pub(crate) const DEFAULT_TIME_BUDGET_FRACTION: f64 = 0.8;
pub(crate) const DEFAULT_CRITICAL_MEMORY_PCT: f64 = 85.0;
pub(crate) const DEFAULT_MAX_ITEMS: u64 = 100_000;
pub(crate) const DEFAULT_RELEASE_EVERY: u32 = 5;

/// Limits for one batch scan.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub base_batch_size: usize,
    /// Floor applied to every computed batch size, including host policy overrides.
    pub min_batch_size: usize,
    pub memory_ceiling_bytes: u64,
    pub time_budget: Duration,
    /// Share of `time_budget` after which the scan stops.
    pub time_budget_fraction: f64,
    pub critical_memory_pct: f64,
    pub max_items: u64,
    /// Run a best-effort memory release every this many batches.
    pub release_every: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            base_batch_size: DEFAULT_BASE_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            memory_ceiling_bytes: DEFAULT_MEMORY_CEILING_BYTES,
            time_budget: Duration::from_secs(DEFAULT_TIME_BUDGET_SECS),
            time_budget_fraction: DEFAULT_TIME_BUDGET_FRACTION,
            critical_memory_pct: DEFAULT_CRITICAL_MEMORY_PCT,
            max_items: DEFAULT_MAX_ITEMS,
            release_every: DEFAULT_RELEASE_EVERY,
        }
    }
}

impl From<&crate::config::BatchSettings> for BatchConfig {
    fn from(settings: &crate::config::BatchSettings) -> Self {
        Self {
            base_batch_size: settings.base_batch_size.get(),
            min_batch_size: settings.min_batch_size.get(),
            memory_ceiling_bytes: settings.memory_ceiling_bytes.get(),
            time_budget: settings.time_budget,
            time_budget_fraction: settings.time_budget_fraction,
            critical_memory_pct: settings.critical_memory_pct,
            max_items: settings.max_items.get(),
            release_every: settings.release_every.get(),
        }
    }
}

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The corpus ran out of matching rows; the result is complete.
    EndOfCorpus,
    CriticalMemory,
    TimeBudget,
    ItemCeiling,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::EndOfCorpus => "end_of_corpus",
            StopReason::CriticalMemory => "critical_memory",
            StopReason::TimeBudget => "time_budget",
            StopReason::ItemCeiling => "item_ceiling",
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Matching ids, deduplicated, ascending by surrogate key.
    pub ids: Vec<ItemId>,
    pub stop_reason: StopReason,
    pub batches: u32,
    pub processed_total: u64,
    pub elapsed: Duration,
    pub memory_delta_bytes: Option<i64>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::EndOfCorpus
    }
}

struct BatchState {
    collected_ids: Vec<ItemId>,
    seen: HashSet<ItemId>,
    cursor: i64,
    processed_total: u64,
    batches: u32,
    started_at: Instant,
    initial_memory: Option<u64>,
}

impl BatchState {
    fn new(started_at: Instant, initial_memory: Option<u64>) -> Self {
        Self {
            collected_ids: Vec::new(),
            seen: HashSet::new(),
            cursor: 0,
            processed_total: 0,
            batches: 0,
            started_at,
            initial_memory,
        }
    }

    fn merge(&mut self, rows: &[ScanRow]) {
        for row in rows {
            if self.seen.insert(row.id) {
                self.collected_ids.push(row.id);
            }
            self.cursor = self.cursor.max(row.surrogate_key);
        }
        self.processed_total += rows.len() as u64;
    }
}

/// Walks a [`ScanFragment`] over the corpus in adaptive batches.
///
/// The scan is snapshot-less: rows inserted concurrently with a key above the current cursor
/// may or may not be included depending on when they land relative to the cursor. Rows are
/// never skipped or repeated across batch boundaries because every fetch resumes strictly after
/// the last key seen.
pub struct BatchProcessor {
    config: BatchConfig,
    corpus: Arc<dyn CorpusRepo>,
    policy: Arc<dyn BatchSizePolicy>,
    memory: Arc<dyn MemoryProbe>,
    clock: Arc<dyn Clock>,
}

impl BatchProcessor {
    pub fn new(
        config: BatchConfig,
        corpus: Arc<dyn CorpusRepo>,
        memory: Arc<dyn MemoryProbe>,
    ) -> Self {
        let policy = Arc::new(TieredBatchPolicy::new(config.min_batch_size));
        Self {
            config,
            corpus,
            policy,
            memory,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the batch size policy. The configured minimum still applies.
    pub fn with_policy(mut self, policy: Arc<dyn BatchSizePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Resident memory as a percentage of the configured ceiling; 0 when unknown.
    pub fn memory_pct(&self) -> f64 {
        match self.memory.resident_bytes() {
            Some(bytes) if self.config.memory_ceiling_bytes > 0 => {
                bytes as f64 / self.config.memory_ceiling_bytes as f64 * 100.0
            }
            _ => 0.0,
        }
    }

    pub fn batch_size_for(&self, mem_pct: f64) -> usize {
        self.policy
            .batch_size(mem_pct, self.config.base_batch_size)
            .max(self.config.min_batch_size)
    }

    #[instrument(
        skip_all,
        fields(joins = fragment.joins.len(), predicates = fragment.predicates.len())
    )]
    pub async fn run(&self, fragment: &ScanFragment) -> Result<BatchOutcome, RepoError> {
        let started_at = self.clock.now();
        let mut state = BatchState::new(started_at, self.memory.resident_bytes());

        let stop_reason = loop {
            if state.processed_total >= self.config.max_items {
                break StopReason::ItemCeiling;
            }

            let mem_pct = self.memory_pct();
            let batch_size = self.batch_size_for(mem_pct);
            let remaining = self.config.max_items.saturating_sub(state.processed_total);
            let requested = usize::try_from(remaining)
                .map_or(batch_size, |r| batch_size.min(r))
                .max(1);

            let rows = self.corpus.scan(fragment, state.cursor, requested).await?;
            state.batches += 1;
            counter!(METRIC_BATCH_FETCH_TOTAL).increment(1);

            debug!(
                batch = state.batches,
                batch_size = requested,
                fetched = rows.len(),
                cursor = state.cursor,
                mem_pct,
                "Batch fetched"
            );

            if rows.is_empty() {
                break StopReason::EndOfCorpus;
            }

            let fetched = rows.len();
            state.merge(&rows);

            if fetched < requested {
                break StopReason::EndOfCorpus;
            }

            if let Some(reason) = self.guard(&state) {
                break reason;
            }

            if self.config.release_every > 0 && state.batches % self.config.release_every == 0 {
                self.corpus.release_caches().await;
                debug!(batch = state.batches, "Released per-batch caches");
            }
        };

        let elapsed = self.clock.now().saturating_duration_since(state.started_at);
        let memory_delta_bytes = match (state.initial_memory, self.memory.resident_bytes()) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };

        if stop_reason != StopReason::EndOfCorpus {
            counter!(METRIC_BATCH_PARTIAL_TOTAL, "reason" => stop_reason.as_str()).increment(1);
        }

        info!(
            stop_reason = stop_reason.as_str(),
            batches = state.batches,
            processed_total = state.processed_total,
            collected = state.collected_ids.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            memory_delta_bytes,
            "Batch scan finished"
        );

        Ok(BatchOutcome {
            ids: state.collected_ids,
            stop_reason,
            batches: state.batches,
            processed_total: state.processed_total,
            elapsed,
            memory_delta_bytes,
        })
    }

    fn guard(&self, state: &BatchState) -> Option<StopReason> {
        let mem_pct = self.memory_pct();
        if mem_pct > self.config.critical_memory_pct {
            error!(
                mem_pct,
                critical_pct = self.config.critical_memory_pct,
                processed_total = state.processed_total,
                "Memory critical, stopping batch scan"
            );
            return Some(StopReason::CriticalMemory);
        }

        let elapsed = self.clock.now().saturating_duration_since(state.started_at);
        let allowed = self
            .config
            .time_budget
            .mul_f64(self.config.time_budget_fraction);
        if elapsed > allowed {
            return Some(StopReason::TimeBudget);
        }

        if state.processed_total >= self.config.max_items {
            return Some(StopReason::ItemCeiling);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::query::StructuredArgs;

    /// Corpus of consecutive ids `1..=len` that records every requested limit.
    struct SequentialCorpus {
        len: i64,
        requested: Mutex<Vec<usize>>,
    }

    impl SequentialCorpus {
        fn new(len: i64) -> Self {
            Self {
                len,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<usize> {
            self.requested.lock().expect("requested lock").clone()
        }
    }

    #[async_trait]
    impl CorpusRepo for SequentialCorpus {
        async fn count(&self, _args: &StructuredArgs) -> Result<u64, RepoError> {
            Ok(self.len as u64)
        }

        async fn scan(
            &self,
            _fragment: &ScanFragment,
            cursor: i64,
            limit: usize,
        ) -> Result<Vec<ScanRow>, RepoError> {
            self.requested.lock().expect("requested lock").push(limit);
            Ok((cursor + 1..=self.len)
                .take(limit)
                .map(|id| ScanRow {
                    id,
                    surrogate_key: id,
                })
                .collect())
        }

        async fn key_exists(&self, _id: ItemId, _meta_key: &str) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    struct FixedMemory(u64);

    impl MemoryProbe for FixedMemory {
        fn resident_bytes(&self) -> Option<u64> {
            Some(self.0)
        }
    }

    /// Memory probe whose reading jumps to `after` once `calls_before` readings were taken.
    struct RisingMemory {
        calls: AtomicU64,
        calls_before: u64,
        before: u64,
        after: u64,
    }

    impl MemoryProbe for RisingMemory {
        fn resident_bytes(&self) -> Option<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Some(if call < self.calls_before {
                self.before
            } else {
                self.after
            })
        }
    }

    struct HalfPolicy;

    impl BatchSizePolicy for HalfPolicy {
        fn batch_size(&self, _mem_pct: f64, base: usize) -> usize {
            base / 100
        }
    }

    fn config() -> BatchConfig {
        BatchConfig {
            memory_ceiling_bytes: 1000,
            time_budget: Duration::from_secs(3600),
            max_items: u64::MAX,
            ..BatchConfig::default()
        }
    }

    #[tokio::test]
    async fn high_memory_uses_minimum_batch_size() {
        let corpus = Arc::new(SequentialCorpus::new(60));
        let processor = BatchProcessor::new(config(), corpus.clone(), Arc::new(FixedMemory(820)));

        let outcome = processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(corpus.requested(), vec![25, 25, 25]);
        assert_eq!(outcome.ids.len(), 60);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn moderate_memory_uses_three_quarters_of_base() {
        let corpus = Arc::new(SequentialCorpus::new(10));
        let processor = BatchProcessor::new(config(), corpus.clone(), Arc::new(FixedMemory(550)));

        processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(corpus.requested(), vec![150]);
    }

    #[tokio::test]
    async fn policy_override_still_respects_floor() {
        let corpus = Arc::new(SequentialCorpus::new(10));
        let processor = BatchProcessor::new(config(), corpus.clone(), Arc::new(FixedMemory(0)))
            .with_policy(Arc::new(HalfPolicy));

        processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(corpus.requested(), vec![25]);
    }

    #[tokio::test]
    async fn critical_memory_stops_with_partial_result() {
        let corpus = Arc::new(SequentialCorpus::new(10_000));
        // Readings: initial, batch size, guard (still fine), batch size, guard (critical).
        let memory = Arc::new(RisingMemory {
            calls: AtomicU64::new(0),
            calls_before: 4,
            before: 100,
            after: 900,
        });
        let processor = BatchProcessor::new(config(), corpus.clone(), memory);

        let outcome = processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(outcome.stop_reason, StopReason::CriticalMemory);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.batches, 2);
        assert_eq!(outcome.ids, (1..=400).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn item_ceiling_caps_last_batch() {
        let corpus = Arc::new(SequentialCorpus::new(10_000));
        let processor = BatchProcessor::new(
            BatchConfig {
                max_items: 450,
                ..config()
            },
            corpus.clone(),
            Arc::new(FixedMemory(0)),
        );

        let outcome = processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(corpus.requested(), vec![200, 200, 50]);
        assert_eq!(outcome.stop_reason, StopReason::ItemCeiling);
        assert_eq!(outcome.processed_total, 450);
    }

    #[tokio::test]
    async fn zero_item_ceiling_is_partial_without_fetching() {
        let corpus = Arc::new(SequentialCorpus::new(10));
        let processor = BatchProcessor::new(
            BatchConfig {
                max_items: 0,
                ..config()
            },
            corpus.clone(),
            Arc::new(FixedMemory(0)),
        );

        let outcome = processor.run(&ScanFragment::default()).await.expect("scan");

        assert!(corpus.requested().is_empty());
        assert_eq!(outcome.stop_reason, StopReason::ItemCeiling);
        assert!(!outcome.is_complete());
        assert!(outcome.ids.is_empty());
        assert_eq!(outcome.batches, 0);
    }

    #[tokio::test]
    async fn exact_multiple_of_batch_size_ends_on_empty_fetch() {
        let corpus = Arc::new(SequentialCorpus::new(400));
        let processor = BatchProcessor::new(config(), corpus.clone(), Arc::new(FixedMemory(0)));

        let outcome = processor.run(&ScanFragment::default()).await.expect("scan");

        assert_eq!(corpus.requested().len(), 3);
        assert!(outcome.is_complete());
        assert_eq!(outcome.ids.len(), 400);
        assert_eq!(outcome.memory_delta_bytes, Some(0));
    }

    #[test]
    fn merge_dedupes_and_advances_cursor() {
        let mut state = BatchState::new(Instant::now(), None);
        state.merge(&[
            ScanRow {
                id: 3,
                surrogate_key: 3,
            },
            ScanRow {
                id: 5,
                surrogate_key: 5,
            },
        ]);
        state.merge(&[
            ScanRow {
                id: 5,
                surrogate_key: 5,
            },
            ScanRow {
                id: 8,
                surrogate_key: 8,
            },
        ]);

        assert_eq!(state.collected_ids, vec![3, 5, 8]);
        assert_eq!(state.cursor, 8);
        assert_eq!(state.processed_total, 4);
    }
}
