use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const UNSET_MIN: u64 = u64::MAX;

/// Outcome of a single request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Snapshot of what has been recorded for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub success_count: u64,
    pub fail_count: u64,
    /// `None` until the first observation
    pub min_latency: Option<Duration>,
    pub max_latency: Option<Duration>,
    /// sum of all recorded latencies
    pub total_latency: Duration,
}

impl RunResult {
    pub fn attempts(&self) -> u64 {
        self.success_count + self.fail_count
    }
}

/// Counts and latency extremes of a run, updated concurrently by all workers.
///
/// Every field is an atomic, latencies are kept in nanoseconds.
#[derive(Debug)]
pub struct RunAggregator {
    success_count: AtomicU64,
    fail_count: AtomicU64,
    min_latency: AtomicU64,
    max_latency: AtomicU64,
    total_latency: AtomicU64,
}

impl Default for RunAggregator {
    fn default() -> Self {
        RunAggregator {
            success_count: AtomicU64::new(0),
            fail_count: AtomicU64::new(0),
            min_latency: AtomicU64::new(UNSET_MIN),
            max_latency: AtomicU64::new(0),
            total_latency: AtomicU64::new(0),
        }
    }
}

impl RunAggregator {
    pub fn record(&self, outcome: Outcome, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX - 1);
        match outcome {
            Outcome::Success => self.success_count.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.fail_count.fetch_add(1, Ordering::Relaxed),
        };
        self.max_latency.fetch_max(nanos, Ordering::Relaxed);
        self.min_latency.fetch_min(nanos, Ordering::Relaxed);
        self.total_latency.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunResult {
        let success_count = self.success_count.load(Ordering::Relaxed);
        let fail_count = self.fail_count.load(Ordering::Relaxed);
        let min = self.min_latency.load(Ordering::Relaxed);
        let (min_latency, max_latency) = if min == UNSET_MIN {
            (None, None)
        } else {
            (
                Some(Duration::from_nanos(min)),
                Some(Duration::from_nanos(self.max_latency.load(Ordering::Relaxed))),
            )
        };
        RunResult {
            success_count,
            fail_count,
            min_latency,
            max_latency,
            total_latency: Duration::from_nanos(self.total_latency.load(Ordering::Relaxed)),
        }
    }
}

/// Run id to aggregator mapping. An entry is created on first use and lives until the run
/// retires it.
#[derive(Default)]
pub struct ResultStore {
    results: RwLock<HashMap<String, Arc<RunAggregator>>>,
}

impl ResultStore {
    /// Get the aggregator of the run, creating an empty one if necessary
    pub async fn aggregator(&self, run_id: &str) -> Arc<RunAggregator> {
        {
            if let Some(agg) = self.results.read().await.get(run_id) {
                return agg.clone();
            }
        }
        self.results
            .write()
            .await
            .entry(run_id.to_string())
            .or_default()
            .clone()
    }

    /// Current result of a run, empty result if nothing has been recorded
    pub async fn read(&self, run_id: &str) -> RunResult {
        self.results
            .read()
            .await
            .get(run_id)
            .map(|agg| agg.snapshot())
            .unwrap_or_default()
    }

    /// Remove the run's entry, returning the final result
    pub async fn retire(&self, run_id: &str) -> RunResult {
        self.results
            .write()
            .await
            .remove(run_id)
            .map(|agg| agg.snapshot())
            .unwrap_or_default()
    }

    pub async fn is_active(&self, run_id: &str) -> bool {
        self.results.read().await.contains_key(run_id)
    }
}
