use crate::{ErrorCode, RunError};
use log::trace;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::time::timeout;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

/// Admission control that never blocks a caller for longer than the acquire timeout.
///
/// Permits are tokens sitting in a bounded channel with capacity `limit`. The channel starts
/// with `initial` tokens.
///
/// * If no permit shows up within the timeout, [`acquire`](Self::acquire) gives up, the caller
///   goes ahead without a permit and the effective limit grows by one.
/// * If a permit is released while the channel is already full, the permit is thrown away and
///   the effective limit shrinks by one.
///
/// The effective limit never gates admission, it only tracks how far the real concurrency
/// drifted from the initial setting.
pub struct ElasticSemaphore {
    permit_sender: Sender<()>,
    permits: Receiver<()>,
    limit: usize,
    effective_limit: i64,
    acquire_timeout: Duration,
}

/// Outcome of [`ElasticSemaphore::acquire`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Admission {
    Permit,
    TimedOut,
}

/// Outcome of [`ElasticSemaphore::release`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Returned {
    ToPool,
    Discarded,
}

impl ElasticSemaphore {
    pub fn new(initial: usize, limit: usize) -> Result<Self, RunError> {
        Self::with_timeout(initial, limit, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_timeout(
        initial: usize,
        limit: usize,
        acquire_timeout: Duration,
    ) -> Result<Self, RunError> {
        if limit == 0 {
            return Err(RunError::new(
                ErrorCode::InvalidPermitLimit,
                "permit limit must be greater than 0",
            ));
        }
        if initial > limit {
            return Err(RunError::new(
                ErrorCode::InvalidPermitLimit,
                &format!("initial permits({initial}) should be <= limit({limit})"),
            ));
        }
        let (permit_sender, permits) = channel(limit);
        for _ in 0..initial {
            // capacity is checked above, can't be full
            let _ = permit_sender.try_send(());
        }
        Ok(ElasticSemaphore {
            permit_sender,
            permits,
            limit,
            effective_limit: initial as i64,
            acquire_timeout,
        })
    }

    pub async fn acquire(&mut self) -> Admission {
        match timeout(self.acquire_timeout, self.permits.recv()).await {
            Ok(_) => Admission::Permit,
            Err(_) => {
                self.effective_limit += 1;
                trace!(
                    "[ElasticSemaphore] - acquire timed out, effective limit: {}",
                    self.effective_limit
                );
                Admission::TimedOut
            }
        }
    }

    pub fn release(&mut self) -> Returned {
        match self.permit_sender.try_send(()) {
            Ok(_) => Returned::ToPool,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.effective_limit -= 1;
                trace!(
                    "[ElasticSemaphore] - pool is full, effective limit: {}",
                    self.effective_limit
                );
                Returned::Discarded
            }
        }
    }

    pub fn current_limit(&self) -> i64 {
        self.effective_limit
    }

    /// Number of permits sitting in the pool
    pub fn available(&self) -> usize {
        self.limit - self.permit_sender.capacity()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
