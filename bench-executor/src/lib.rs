pub mod aggregate;
mod coordinator;
mod dispatcher;
pub mod selector;
pub mod semaphore;
mod worker;

pub use coordinator::{summarize, Benchmarker, RunPlan, STATUS_CLEANUP_INTERVAL};
pub use worker::WorkerReport;

use http::Uri;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatcher::DEFAULT_DISPATCH_TICK;
use crate::semaphore::DEFAULT_ACQUIRE_TIMEOUT;

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Draining,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    EmptyUrlList,
    InvalidUrl,
    InvalidDuration,
    InvalidPermitLimit,
    InvalidWorkerCount,
}

/// Reason a run couldn't start
#[derive(Debug, Clone)]
pub struct RunError {
    pub code: ErrorCode,
    pub message: String,
}

impl RunError {
    pub fn new(code: ErrorCode, message: &str) -> Self {
        RunError {
            code,
            message: message.to_string(),
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl StdError for RunError {}

/// Unit of work handed from the dispatcher to the worker pool
#[derive(Debug, Clone)]
pub struct DispatchPacket {
    pub run_id: Arc<str>,
    pub url: Uri,
}

/// Process wide settings, shared by all runs
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// upper bound and default of workers per run, also the dispatch queue size
    pub max_workers: usize,
    pub client_timeout: Duration,
    /// per worker connection pool ceiling
    pub max_idle_per_host: usize,
    pub initial_permits: usize,
    pub permit_limit: usize,
    pub acquire_timeout: Duration,
    pub dispatch_tick: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            max_workers: 1,
            client_timeout: Duration::from_millis(common_env::DEFAULT_HTTP_CLIENT_TIMEOUT),
            max_idle_per_host: common_env::DEFAULT_MAX_IDLE_CONNECTION_PER_HOST,
            initial_permits: common_env::DEFAULT_ELASTIC_INITIAL_PERMITS,
            permit_limit: common_env::DEFAULT_ELASTIC_PERMIT_LIMIT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            dispatch_tick: DEFAULT_DISPATCH_TICK,
        }
    }
}

impl BenchConfig {
    pub fn from_env() -> Self {
        BenchConfig {
            max_workers: common_env::max_worker_count(),
            client_timeout: common_env::http_client_timeout(),
            max_idle_per_host: common_env::max_idle_connection_per_host(),
            initial_permits: common_env::elastic_initial_permits(),
            permit_limit: common_env::elastic_permit_limit(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_common {
    use crate::BenchConfig;
    use bench_metrics::MetricsFactory;
    use env_logger::Env;
    use std::sync::Once;
    use std::time::Duration;

    static ONCE: Once = Once::new();

    pub fn setup() {
        ONCE.call_once(|| {
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
                .format_timestamp_millis()
                .is_test(true)
                .try_init();
        });
    }

    pub fn test_config() -> BenchConfig {
        BenchConfig {
            max_workers: 4,
            client_timeout: Duration::from_secs(2),
            max_idle_per_host: 16,
            initial_permits: 2,
            permit_limit: 8,
            acquire_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    pub fn metrics_factory() -> &'static MetricsFactory {
        Box::leak(Box::new(MetricsFactory::default()))
    }
}
