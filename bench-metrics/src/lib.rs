use lazy_static::lazy_static;
use log::error;
use prometheus::core::Collector;
use prometheus::process_collector::ProcessCollector;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

lazy_static! {
    pub static ref METRICS_FACTORY: MetricsFactory = MetricsFactory::default();
}

macro_rules! log_error {
    ($result:expr) => {
        if let Err(e) = $result {
            error!("{}", e.to_string());
        }
    };
}

/// Keeps one [`Metrics`] per run, all registered to a single registry.
pub struct MetricsFactory {
    registry: Registry,
    metrics: RwLock<HashMap<String, Arc<Metrics>>>,
}

impl Default for MetricsFactory {
    fn default() -> Self {
        let registry = Registry::default();
        let pc = ProcessCollector::for_self();
        let _ = registry.register(Box::new(pc));
        Self {
            registry,
            metrics: RwLock::default(),
        }
    }
}

impl MetricsFactory {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn metrics(&self, job_id: &str) -> Arc<Metrics> {
        {
            if let Some(m) = self.metrics.read().await.get(job_id) {
                return m.clone();
            }
        }

        let mut write_guard = self.metrics.write().await;
        //retry again to check if another task already created metrics
        if let Some(m) = write_guard.get(job_id) {
            return m.clone();
        }

        let opts = Opts::new("upstream_request_count", "request sent to upstream")
            .const_label("job_id", job_id);
        let upstream_request_count = IntCounter::with_opts(opts).expect("valid metric opts");

        let opts = Opts::new(
            "upstream_request_status_count",
            "upstream request count per status",
        )
        .const_label("job_id", job_id);
        let upstream_request_status_count =
            IntCounterVec::new(opts, &["status"]).expect("valid metric opts");

        let opts = Opts::new(
            "dispatched_packet_count",
            "requests handed over to the worker pool",
        )
        .const_label("job_id", job_id);
        let dispatched_packet_count = IntCounter::with_opts(opts).expect("valid metric opts");

        let opts = Opts::new(
            "elastic_effective_limit",
            "sum of effective limit of all workers' elastic semaphore",
        )
        .const_label("job_id", job_id);
        let elastic_effective_limit = IntGauge::with_opts(opts).expect("valid metric opts");

        let metrics = Metrics {
            upstream_request_count,
            upstream_request_status_count,
            dispatched_packet_count,
            elastic_effective_limit,
        };
        for collector in metrics.collectors() {
            log_error!(self.registry.register(collector));
        }
        let metrics = Arc::new(metrics);
        write_guard.insert(String::from(job_id), metrics.clone());
        metrics
    }

    pub async fn remove_metrics(&self, job_id: &str) {
        let metrics = { self.metrics.write().await.remove(job_id) };
        if let Some(m) = metrics {
            for collector in m.collectors() {
                log_error!(self.registry.unregister(collector));
            }
        }
    }
}

pub struct Metrics {
    upstream_request_count: IntCounter,
    upstream_request_status_count: IntCounterVec,
    dispatched_packet_count: IntCounter,
    elastic_effective_limit: IntGauge,
}

impl Metrics {
    pub fn upstream_request_count(&self, increment: u64) {
        self.upstream_request_count.inc_by(increment);
    }

    pub fn upstream_request_status_count(&self, increment: u64, status: &str) {
        self.upstream_request_status_count
            .with_label_values(&[status])
            .inc_by(increment);
    }

    pub fn dispatched_packet_count(&self, increment: u64) {
        self.dispatched_packet_count.inc_by(increment);
    }

    pub fn elastic_effective_limit(&self, change: i64) {
        self.elastic_effective_limit.add(change);
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.upstream_request_count.clone()),
            Box::new(self.upstream_request_status_count.clone()),
            Box::new(self.dispatched_packet_count.clone()),
            Box::new(self.elastic_effective_limit.clone()),
        ]
    }
}
