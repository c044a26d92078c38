use crate::aggregate::{Outcome, RunAggregator};
use crate::semaphore::{Admission, ElasticSemaphore, Returned};
use crate::{BenchConfig, DispatchPacket, RunError};
use bench_metrics::Metrics;
use futures_util::future::join_all;
use http::{StatusCode, Uri};
use hyper::client::HttpConnector;
use hyper::{Body, Client};
use log::{debug, error, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Receiving end of the dispatch queue, shared by all workers of a run
pub(crate) type SharedQueue = Arc<Mutex<Receiver<DispatchPacket>>>;

/// Result of a single GET
#[derive(Debug)]
pub(crate) struct Probe {
    pub(crate) outcome: Outcome,
    pub(crate) latency: Duration,
    pub(crate) status: Option<StatusCode>,
}

pub(crate) fn is_success(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection()
}

/// A GET-only http client with a per-request timeout
pub(crate) struct HttpProbe {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpProbe {
    pub(crate) fn new(request_timeout: Duration, max_idle_per_host: usize) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(max_idle_per_host)
            .build_http();
        HttpProbe {
            client,
            timeout: request_timeout,
        }
    }

    /// GET `uri`, the configured timeout bounds the whole exchange including the body.
    pub(crate) async fn get(&self, uri: &Uri) -> Probe {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let result = timeout_at(deadline, self.client.get(uri.clone())).await;
        let latency = start.elapsed();
        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                // drain the body, otherwise the connection can't go back to the pool
                match timeout_at(deadline, hyper::body::to_bytes(response.into_body())).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => trace!("[HttpProbe] - {} - error reading body: {}", uri, e),
                    Err(_) => trace!("[HttpProbe] - {} - timed out reading body", uri),
                }
                let outcome = if is_success(status) {
                    Outcome::Success
                } else {
                    Outcome::Failure
                };
                Probe {
                    outcome,
                    latency,
                    status: Some(status),
                }
            }
            Ok(Err(e)) => {
                trace!("[HttpProbe] - {} - error: {}", uri, e);
                Probe {
                    outcome: Outcome::Failure,
                    latency,
                    status: None,
                }
            }
            Err(_) => {
                trace!("[HttpProbe] - {} - timed out", uri);
                Probe {
                    outcome: Outcome::Failure,
                    latency,
                    status: None,
                }
            }
        }
    }
}

/// What a worker did before the queue closed
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerReport {
    pub processed: u64,
    pub effective_limit: i64,
}

pub(crate) struct Worker {
    id: usize,
    probe: HttpProbe,
    semaphore: ElasticSemaphore,
}

impl Worker {
    pub(crate) fn new(id: usize, config: &BenchConfig) -> Result<Self, RunError> {
        let semaphore = ElasticSemaphore::with_timeout(
            config.initial_permits,
            config.permit_limit,
            config.acquire_timeout,
        )?;
        Ok(Worker {
            id,
            probe: HttpProbe::new(config.client_timeout, config.max_idle_per_host),
            semaphore,
        })
    }

    /// Process packets until the queue is closed and empty
    pub(crate) async fn run(
        mut self,
        queue: SharedQueue,
        aggregator: Arc<RunAggregator>,
        metrics: Arc<Metrics>,
    ) -> WorkerReport {
        let mut processed = 0u64;
        metrics.elastic_effective_limit(self.semaphore.current_limit());
        loop {
            if let Admission::TimedOut = self.semaphore.acquire().await {
                metrics.elastic_effective_limit(1);
            }
            let packet = { queue.lock().await.recv().await };
            let packet = match packet {
                Some(packet) => packet,
                None => {
                    self.release(&metrics);
                    break;
                }
            };
            metrics.upstream_request_count(1);
            let probe = self.probe.get(&packet.url).await;
            trace!(
                "[Worker-{}] - [{}] - {} - {:?}",
                self.id,
                &packet.run_id,
                &packet.url,
                &probe
            );
            match probe.status {
                Some(status) => metrics.upstream_request_status_count(1, status.as_str()),
                None => metrics.upstream_request_status_count(1, "error"),
            }
            aggregator.record(probe.outcome, probe.latency);
            self.release(&metrics);
            processed += 1;
        }
        debug!(
            "[Worker-{}] - queue closed, processed: {}, effective limit: {}",
            self.id,
            processed,
            self.semaphore.current_limit()
        );
        WorkerReport {
            processed,
            effective_limit: self.semaphore.current_limit(),
        }
    }

    fn release(&mut self, metrics: &Metrics) {
        if let Returned::Discarded = self.semaphore.release() {
            metrics.elastic_effective_limit(-1);
        }
    }
}

/// Fixed number of workers consuming one dispatch queue
pub(crate) struct WorkerPool {
    idle: Vec<Worker>,
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WorkerPool {
    /// Build all the workers, nothing runs until [`start`](Self::start)
    pub(crate) fn build(worker_count: usize, config: &BenchConfig) -> Result<Self, RunError> {
        let idle = (0..worker_count)
            .map(|id| Worker::new(id, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkerPool {
            idle,
            handles: Vec::with_capacity(worker_count),
        })
    }

    pub(crate) fn start(
        &mut self,
        queue: Receiver<DispatchPacket>,
        aggregator: Arc<RunAggregator>,
        metrics: Arc<Metrics>,
    ) {
        let queue: SharedQueue = Arc::new(Mutex::new(queue));
        for worker in self.idle.drain(..) {
            self.handles.push(tokio::spawn(worker.run(
                queue.clone(),
                aggregator.clone(),
                metrics.clone(),
            )));
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.idle.len() + self.handles.len()
    }

    /// Wait for every worker to exit. Returns only after the queue has been closed.
    pub(crate) async fn join(self) -> Vec<WorkerReport> {
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("[WorkerPool] - worker failed: {}", e);
                    None
                }
            })
            .collect()
    }
}
