use crate::aggregate::{ResultStore, RunResult};
use crate::dispatcher::Dispatcher;
use crate::selector::TargetSelector;
use crate::worker::WorkerPool;
use crate::{BenchConfig, ErrorCode, RunError, RunState};
use bench_http::{RunRequest, RunSummary, DEFAULT_DURATION_SECS};
use bench_metrics::MetricsFactory;
use http::Uri;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::channel;
use tokio::sync::RwLock;
use tokio::time::sleep;
use uuid::Uuid;

/// A validated and normalized [`RunRequest`]
#[derive(Debug)]
pub struct RunPlan {
    pub run_id: Arc<str>,
    pub duration: Duration,
    pub workers: usize,
    pub selector: TargetSelector<Uri>,
}

impl RunPlan {
    pub fn new(request: RunRequest, config: &BenchConfig) -> Result<Self, RunError> {
        Self::with_run_id(run_id(&request.token), request, config)
    }

    fn with_run_id(
        run_id: String,
        request: RunRequest,
        config: &BenchConfig,
    ) -> Result<Self, RunError> {
        if config.max_workers == 0 {
            return Err(RunError::new(
                ErrorCode::InvalidWorkerCount,
                "max workers must be at least 1",
            ));
        }
        let duration = match request.time {
            0 => DEFAULT_DURATION_SECS,
            t if t < 0 => {
                return Err(RunError::new(
                    ErrorCode::InvalidDuration,
                    &format!("invalid duration: {}", t),
                ))
            }
            t => t,
        };
        let workers = if request.worker_num <= 0 {
            config.max_workers
        } else {
            std::cmp::min(request.worker_num as usize, config.max_workers)
        };
        let urls = request
            .urls
            .iter()
            .map(|url| parse_url(url))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RunPlan {
            run_id: Arc::from(run_id),
            duration: Duration::from_secs(duration as u64),
            workers,
            selector: TargetSelector::new(urls)?,
        })
    }
}

fn parse_url(url: &str) -> Result<Uri, RunError> {
    let uri = url
        .trim()
        .parse::<Uri>()
        .map_err(|e| RunError::new(ErrorCode::InvalidUrl, &format!("{}: {}", url, e)))?;
    match (uri.scheme_str(), uri.host()) {
        (Some("http"), Some(_)) => Ok(uri),
        (Some(scheme), Some(_)) => Err(RunError::new(
            ErrorCode::InvalidUrl,
            &format!("{}: unsupported scheme {}", url, scheme),
        )),
        _ => Err(RunError::new(
            ErrorCode::InvalidUrl,
            &format!("{}: absolute http url required", url),
        )),
    }
}

fn run_id(token: &str) -> String {
    let token = token.trim();
    if token.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        token.to_string()
    }
}

/// Derive the final statistics. The average is the elapsed wall clock time divided by the
/// number of attempts, zero when nothing was attempted.
pub fn summarize(result: &RunResult, elapsed: Duration) -> RunSummary {
    let secs = elapsed.as_secs_f64();
    let requests_per_sec = if secs > 0f64 {
        result.success_count as f64 / secs
    } else {
        0f64
    };
    let attempts = result.attempts();
    let average_latency = if attempts == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((elapsed.as_nanos() / attempts as u128) as u64)
    };
    RunSummary {
        success_count: result.success_count,
        requests_per_sec,
        fail_count: result.fail_count,
        average_latency,
        total_elapsed: elapsed,
        max_latency: result.max_latency.unwrap_or_default(),
        min_latency: result.min_latency.unwrap_or_default(),
    }
}

/// How often [`Benchmarker::cleanup_status`] evicts finished runs
pub const STATUS_CLEANUP_INTERVAL: Duration = Duration::from_secs(1800);

/// Runs benchmarks, one [`run`](Self::run) call per benchmark.
pub struct Benchmarker {
    config: BenchConfig,
    results: ResultStore,
    status: RwLock<BTreeMap<String, RunState>>,
    metrics: &'static MetricsFactory,
}

impl Benchmarker {
    pub fn new(config: BenchConfig, metrics: &'static MetricsFactory) -> Self {
        Benchmarker {
            config,
            results: ResultStore::default(),
            status: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub async fn status(&self, run_id: &str) -> Option<RunState> {
        self.status.read().await.get(run_id).copied()
    }

    /// Periodically forget runs that are `Completed` or `Failed`. Never returns.
    pub async fn cleanup_status(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let evicted = self.evict_finished().await;
            if evicted > 0 {
                debug!("[run] - status cleanup, evicted: {}", evicted);
            }
        }
    }

    async fn evict_finished(&self) -> usize {
        let finished = {
            let read_guard = self.status.read().await;
            read_guard
                .iter()
                .filter(|(_, state)| matches!(state, RunState::Completed | RunState::Failed))
                .map(|(id, _)| id.clone())
                .collect::<Vec<String>>()
        };
        let mut write_guard = self.status.write().await;
        let mut evicted = 0;
        for id in finished {
            // a new run may have reused the id in between
            if let Some(RunState::Completed | RunState::Failed) = write_guard.get(&id) {
                write_guard.remove(&id);
                evicted += 1;
            }
        }
        evicted
    }

    /// Execute a benchmark and wait for it to finish.
    ///
    /// Starting -> Running -> Draining -> Completed. Returns an error without sending any
    /// request if the request is invalid.
    ///
    /// A request without a token gets a generated run id. The id isn't part of the
    /// [`RunSummary`], it's only logged.
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary, RunError> {
        let run_id = run_id(&request.token);
        if request.token.trim().is_empty() {
            info!("[run] - [{}] - no token in request, generated run id", &run_id);
        }
        debug!("[run] - [{}] - handling request: {:?}", &run_id, &request);
        let plan = RunPlan::with_run_id(run_id.clone(), request, &self.config)
            .and_then(|plan| Ok((WorkerPool::build(plan.workers, &self.config)?, plan)));
        let (mut pool, plan) = match plan {
            Ok(plan) => plan,
            Err(e) => {
                error!("[run] - [{}] - invalid request: {}", &run_id, &e);
                self.set_status(&run_id, RunState::Failed).await;
                return Err(e);
            }
        };

        if self.results.is_active(&run_id).await {
            warn!(
                "[run] - [{}] - a run with the same id is in progress, results will be merged",
                &run_id
            );
        }
        self.set_status(&run_id, RunState::Starting).await;
        let metrics = self.metrics.metrics(&run_id).await;
        let aggregator = self.results.aggregator(&run_id).await;
        let (queue, receiver) = channel(self.config.max_workers);
        pool.start(receiver, aggregator, metrics.clone());
        info!(
            "[run] - [{}] - started {} workers, duration: {:?}, targets: {}",
            &run_id,
            pool.size(),
            plan.duration,
            plan.selector.len()
        );

        self.set_status(&run_id, RunState::Running).await;
        let dispatcher =
            Dispatcher::new(plan.run_id, plan.selector, self.config.dispatch_tick)
                .start(queue, metrics);
        let start = Instant::now();
        sleep(plan.duration).await;

        self.set_status(&run_id, RunState::Draining).await;
        let dispatched = match dispatcher.stop().await {
            Some((queue, dispatched)) => {
                // closing the queue lets the workers exit once it's drained
                drop(queue);
                dispatched
            }
            None => 0,
        };
        let reports = pool.join().await;
        let elapsed = start.elapsed();

        let result = self.results.retire(&run_id).await;
        self.metrics.remove_metrics(&run_id).await;
        let processed: u64 = reports.iter().map(|r| r.processed).sum();
        let effective_limit: i64 = reports.iter().map(|r| r.effective_limit).sum();
        info!(
            "[run] - [{}] - finished in {}s, dispatched: {}, processed: {}, effective limit: {}",
            &run_id,
            elapsed.as_secs_f64(),
            dispatched,
            processed,
            effective_limit
        );
        debug!("[run] - [{}] - result: {:?}", &run_id, &result);
        self.set_status(&run_id, RunState::Completed).await;
        Ok(summarize(&result, elapsed))
    }

    async fn set_status(&self, run_id: &str, state: RunState) {
        self.status.write().await.insert(run_id.to_string(), state);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_common::{metrics_factory, setup, test_config};
    use httpmock::prelude::*;

    fn request(urls: &[&str], time: i64, worker_num: i64) -> RunRequest {
        RunRequest::new(
            "plan-test",
            urls.iter().map(|u| u.to_string()).collect(),
            time,
            worker_num,
        )
    }

    #[test]
    fn worker_count_is_clamped() {
        let config = test_config();
        let plan = RunPlan::new(request(&["http://a/"], 1, 100), &config).unwrap();
        assert_eq!(plan.workers, config.max_workers);
        let plan = RunPlan::new(request(&["http://a/"], 1, 3), &config).unwrap();
        assert_eq!(plan.workers, 3);
    }

    #[test]
    fn defaults_are_applied() {
        let config = test_config();
        let plan = RunPlan::new(request(&["http://a/"], 0, 0), &config).unwrap();
        assert_eq!(plan.duration, Duration::from_secs(10));
        assert_eq!(plan.workers, config.max_workers);
        assert_eq!(&*plan.run_id, "plan-test");

        let plan = RunPlan::new(request(&["http://a/"], 2, -3), &config).unwrap();
        assert_eq!(plan.duration, Duration::from_secs(2));
        assert_eq!(plan.workers, config.max_workers);
    }

    #[test]
    fn zero_max_workers_is_rejected() {
        let mut config = test_config();
        config.max_workers = 0;
        let err = RunPlan::new(request(&["http://a/"], 1, 0), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidWorkerCount);
        let err = RunPlan::new(request(&["http://a/"], 1, 5), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidWorkerCount);
    }

    #[tokio::test]
    async fn zero_max_workers_fails_the_run() {
        setup();
        let mut config = test_config();
        config.max_workers = 0;
        let bench = Benchmarker::new(config, metrics_factory());
        let req = RunRequest::new("no-workers", vec!["http://127.0.0.1:1/".into()], 1, 0);
        let err = bench.run(req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidWorkerCount);
        assert_eq!(bench.status("no-workers").await, Some(RunState::Failed));
    }

    #[tokio::test]
    async fn generated_run_id_is_recorded() {
        setup();
        let bench = Benchmarker::new(test_config(), metrics_factory());
        let req = RunRequest::new("", vec![], 1, 1);
        assert!(bench.run(req).await.is_err());
        let status = bench.status.read().await;
        assert_eq!(status.len(), 1);
        let (id, state) = status.iter().next().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(*state, RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_runs_are_evicted() {
        setup();
        let bench: &'static Benchmarker =
            Box::leak(Box::new(Benchmarker::new(test_config(), metrics_factory())));
        bench.set_status("done", RunState::Completed).await;
        bench.set_status("rejected", RunState::Failed).await;
        bench.set_status("busy", RunState::Running).await;
        for i in 0..100 {
            assert!(bench.run(request(&[], 1, 1)).await.is_err());
            bench
                .set_status(&format!("rejected-{}", i), RunState::Failed)
                .await;
        }

        tokio::spawn(bench.cleanup_status(Duration::from_secs(60)));
        sleep(Duration::from_secs(1)).await;
        assert_eq!(bench.status("done").await, None);
        assert_eq!(bench.status("rejected").await, None);
        assert_eq!(bench.status("plan-test").await, None);
        assert_eq!(bench.status("busy").await, Some(RunState::Running));
        assert_eq!(bench.status.read().await.len(), 1);

        bench.set_status("busy", RunState::Completed).await;
        sleep(Duration::from_secs(30)).await;
        assert_eq!(bench.status("busy").await, Some(RunState::Completed));
        sleep(Duration::from_secs(31)).await;
        assert_eq!(bench.status("busy").await, None);
    }

    #[test]
    fn empty_token_gets_uuid() {
        let mut req = request(&["http://a/"], 1, 1);
        req.token = String::new();
        let plan = RunPlan::new(req, &test_config()).unwrap();
        assert!(Uuid::parse_str(&plan.run_id).is_ok());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let config = test_config();
        let err = RunPlan::new(request(&[], 1, 1), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyUrlList);
        let err = RunPlan::new(request(&["http://a/"], -1, 1), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidDuration);
        let err = RunPlan::new(request(&["/relative/path"], 1, 1), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUrl);
        let err = RunPlan::new(request(&["https://a/"], 1, 1), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUrl);
        let err = RunPlan::new(request(&["http://a/", "not a url"], 1, 1), &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidUrl);
    }

    #[test]
    fn plan_selector_keeps_url_order() {
        let mut plan =
            RunPlan::new(request(&["http://a/", "http://b/"], 1, 1), &test_config()).unwrap();
        let hosts: Vec<_> = (0..4)
            .map(|_| plan.selector.next().host().unwrap().to_string())
            .collect();
        assert_eq!(hosts, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn summary_without_attempts() {
        let summary = summarize(&RunResult::default(), Duration::from_secs(1));
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.fail_count, 0);
        assert_eq!(summary.requests_per_sec, 0f64);
        assert_eq!(summary.average_latency, Duration::ZERO);
        assert_eq!(summary.min_latency, Duration::ZERO);
        assert_eq!(summary.max_latency, Duration::ZERO);
        assert_eq!(summary.total_elapsed, Duration::from_secs(1));
    }

    #[test]
    fn summary_derived_values() {
        let result = RunResult {
            success_count: 30,
            fail_count: 10,
            min_latency: Some(Duration::from_millis(2)),
            max_latency: Some(Duration::from_millis(9)),
            total_latency: Duration::from_millis(200),
        };
        let summary = summarize(&result, Duration::from_secs(2));
        assert_eq!(summary.requests_per_sec, 15f64);
        assert_eq!(summary.average_latency, Duration::from_millis(50));
        assert_eq!(summary.min_latency, Duration::from_millis(2));
        assert_eq!(summary.max_latency, Duration::from_millis(9));
    }

    #[tokio::test]
    async fn failed_validation_is_recorded() {
        setup();
        let bench = Benchmarker::new(test_config(), metrics_factory());
        let result = bench.run(request(&[], 1, 1)).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::EmptyUrlList);
        assert_eq!(bench.status("plan-test").await, Some(RunState::Failed));
        assert!(!bench.results.is_active("plan-test").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_against_mock_server() {
        setup();
        let server = MockServer::start_async().await;
        let a = server
            .mock_async(|when, then| {
                when.method(GET).path("/a");
                then.status(200).body("a");
            })
            .await;
        let b = server
            .mock_async(|when, then| {
                when.method(GET).path("/b");
                then.status(503);
            })
            .await;

        let bench = Benchmarker::new(test_config(), metrics_factory());
        let url_a = server.url("/a");
        let url_b = server.url("/b");
        let req = RunRequest::new("mock-run", vec![url_a, url_b], 1, 2);
        let summary = bench.run(req).await.unwrap();

        let hits_a = a.hits_async().await as u64;
        let hits_b = b.hits_async().await as u64;
        assert_eq!(summary.success_count, hits_a);
        assert_eq!(summary.fail_count, hits_b);
        more_asserts::assert_gt!(summary.success_count, 0);
        // strict alternation, at most one packet apart
        more_asserts::assert_le!(hits_a.abs_diff(hits_b), 1);
        more_asserts::assert_ge!(summary.total_elapsed, Duration::from_secs(1));
        more_asserts::assert_gt!(summary.requests_per_sec, 0f64);
        more_asserts::assert_le!(summary.min_latency, summary.max_latency);
        assert_eq!(bench.status("mock-run").await, Some(RunState::Completed));
        assert!(!bench.results.is_active("mock-run").await);
        assert_eq!(bench.results.read("mock-run").await, RunResult::default());
    }
}
