use crate::selector::TargetSelector;
use crate::DispatchPacket;
use bench_metrics::Metrics;
use http::Uri;
use log::{debug, error};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_DISPATCH_TICK: Duration = Duration::from_micros(1);

/// Pushes one packet per tick onto the dispatch queue.
///
/// A full queue blocks the push, so slow workers slow the dispatcher down.
pub(crate) struct Dispatcher {
    run_id: Arc<str>,
    selector: TargetSelector<Uri>,
    tick: Duration,
}

/// Handle of a running dispatcher
pub(crate) struct DispatcherHandle {
    stop: CancellationToken,
    handle: JoinHandle<(Sender<DispatchPacket>, u64)>,
}

impl Dispatcher {
    pub(crate) fn new(run_id: Arc<str>, selector: TargetSelector<Uri>, tick: Duration) -> Self {
        Dispatcher {
            run_id,
            selector,
            tick,
        }
    }

    pub(crate) fn start(
        self,
        queue: Sender<DispatchPacket>,
        metrics: Arc<Metrics>,
    ) -> DispatcherHandle {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(self.dispatch(queue, stop.clone(), metrics));
        DispatcherHandle { stop, handle }
    }

    async fn dispatch(
        mut self,
        queue: Sender<DispatchPacket>,
        stop: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> (Sender<DispatchPacket>, u64) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut dispatched = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let packet = DispatchPacket {
                run_id: self.run_id.clone(),
                url: self.selector.next().clone(),
            };
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                result = queue.send(packet) => {
                    if result.is_err() {
                        error!("[Dispatcher] - [{}] - queue closed unexpectedly", &self.run_id);
                        break;
                    }
                    dispatched += 1;
                    metrics.dispatched_packet_count(1);
                }
            }
        }
        debug!(
            "[Dispatcher] - [{}] - stopped, dispatched: {}",
            &self.run_id, dispatched
        );
        (queue, dispatched)
    }
}

impl DispatcherHandle {
    /// Stop ticking and hand the queue back, still open, along with the number of
    /// dispatched packets.
    pub(crate) async fn stop(self) -> Option<(Sender<DispatchPacket>, u64)> {
        self.stop.cancel();
        match self.handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!("[Dispatcher] - dispatcher task failed: {}", e);
                None
            }
        }
    }
}
