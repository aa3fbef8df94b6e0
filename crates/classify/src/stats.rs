use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

/// Per-run classification counters. Each processed entity bumps
/// `total_requests` once and exactly one category.
#[derive(Default)]
pub struct ClassificationStats {
    total_requests: AtomicUsize,
    cache_hits: AtomicUsize,
    api_calls: AtomicUsize,
    errors: AtomicUsize,

    // Timing (in microseconds), over calls that ran to completion
    completed_calls: AtomicUsize,
    total_call_time_us: AtomicU64,

    categories: DashMap<String, usize>,
}

impl ClassificationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A call was dispatched to the classifier, whether or not it finishes.
    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_time(&self, duration: Duration) {
        self.completed_calls.fetch_add(1, Ordering::Relaxed);
        self.total_call_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_category(&self, category: &str) {
        *self.categories.entry(category.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let completed_calls = self.completed_calls.load(Ordering::Relaxed);

        StatsSnapshot {
            total_requests,
            cache_hits,
            api_calls,
            errors: self.errors.load(Ordering::Relaxed),
            cache_hit_rate: ratio(cache_hits, total_requests),
            avg_call_time_ms: if completed_calls > 0 {
                self.total_call_time_us.load(Ordering::Relaxed) as f64
                    / completed_calls as f64
                    / 1000.0
            } else {
                0.0
            },
            categories: self
                .categories
                .iter()
                .map(|r| (r.key().clone(), *r.value()))
                .collect(),
        }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: usize,
    pub cache_hits: usize,
    pub api_calls: usize,
    pub errors: usize,
    pub cache_hit_rate: f64,
    pub avg_call_time_ms: f64,
    pub categories: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = ClassificationStats::new();
        for _ in 0..4 {
            stats.record_request();
        }
        stats.record_cache_hit();
        for _ in 0..3 {
            stats.record_api_call();
        }
        // the third call never finished
        stats.record_call_time(Duration::from_millis(10));
        stats.record_call_time(Duration::from_millis(30));
        stats.record_error();
        stats.record_category("parking");
        stats.record_category("parking");
        stats.record_category("other");

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.api_calls, 3);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.cache_hit_rate, 0.25);
        assert_eq!(snap.avg_call_time_ms, 20.0);
        assert_eq!(snap.categories["parking"], 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = ClassificationStats::new().snapshot();
        assert_eq!(snap.cache_hit_rate, 0.0);
        assert_eq!(snap.avg_call_time_ms, 0.0);
        assert!(snap.categories.is_empty());
    }
}
