use std::sync::Arc;

use dashmap::DashMap;
use extract::Classification;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::stats::ClassificationStats;

/// Result of the one classifier call made for a block name in a run; the
/// error side carries the fallback reasoning.
pub(crate) type CallOutcome = Result<Classification, String>;

/// State for one invocation: cache handle, counters, cancellation, and the
/// per-block-name call slots. Nothing here outlives the run except what the
/// cache flushes to disk.
pub struct RunContext {
    pub run_id: Uuid,
    pub cache: Arc<CacheStore>,
    pub stats: Arc<ClassificationStats>,
    pub cancel: CancellationToken,
    pub(crate) in_flight: DashMap<String, Arc<OnceCell<CallOutcome>>>,
}

impl RunContext {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cache,
            stats: Arc::new(ClassificationStats::new()),
            cancel: CancellationToken::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Share an externally owned token (signal handler, deadline).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn call_slot(&self, key: &str) -> Arc<OnceCell<CallOutcome>> {
        self.in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}
