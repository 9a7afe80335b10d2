//! Stream trigger: hosts the capture processor on the change feed.
//!
//! # Flow
//!
//! 1. Read up to `batch_size` events after the consumer's committed position
//! 2. Hand the batch to [`CaptureProcessor::process_batch`]
//! 3. Commit the position to the batch's last sequence only if the whole
//!    batch succeeded (a failed batch is redelivered whole)
//! 4. Retry a failing batch with exponential backoff; once the first attempt
//!    and `max_retries` retries have all failed, apply the
//!    [`CaptureFailurePolicy`]
//!
//! Shutdown interrupts a backoff wait. The batch stays uncommitted and is
//! redelivered on the next start.

use crate::archive::ArchiveStore;
use crate::error::{CaptureError, CaptureResult};
use crate::processor::{CaptureProcessor, CaptureReport};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use worklog_config_and_utils::{CaptureFailurePolicy, Config};
use worklog_sessions::{ChangeFeed, Clock};

/// Consumer name under which the trigger's position is stored.
pub const CONSUMER_NAME: &str = "capture-processor";

/// Configuration for the stream trigger.
///
/// Retry delay follows exponential backoff: `base * 2^(retry_count - 1)`
/// capped at `backoff_max`.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub failure_policy: CaptureFailurePolicy,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(1000),
            failure_policy: CaptureFailurePolicy::Halt,
            max_retries: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl TriggerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.capture_batch_size,
            poll_interval: config.capture_poll_interval(),
            failure_policy: config.capture_failure_policy,
            max_retries: config.capture_max_retries,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
        }
    }
}

/// Computes the exponential backoff delay for a given retry count.
///
/// | Retry Count | Delay (base=2s, max=300s) |
/// |-------------|-------|
/// | 0           | 0s    |
/// | 1           | 2s    |
/// | 2           | 4s    |
/// | 3           | 8s    |
/// | 8           | 256s  |
/// | 9+          | 300s (capped) |
pub fn compute_backoff(retry_count: u32, config: &TriggerConfig) -> Duration {
    if retry_count == 0 {
        return Duration::ZERO;
    }

    let base_ms = config.backoff_base.as_millis() as u64;
    let max_ms = config.backoff_max.as_millis() as u64;
    let multiplier = 1u64.checked_shl(retry_count - 1).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
}

/// Drives a [`CaptureProcessor`] from a [`ChangeFeed`].
pub struct StreamTrigger<F: ChangeFeed, A: ArchiveStore, C: Clock> {
    feed: F,
    processor: CaptureProcessor<A, C>,
    config: TriggerConfig,
}

impl<F: ChangeFeed, A: ArchiveStore, C: Clock> StreamTrigger<F, A, C> {
    pub fn new(feed: F, processor: CaptureProcessor<A, C>, config: TriggerConfig) -> Self {
        Self {
            feed,
            processor,
            config,
        }
    }

    pub fn processor(&self) -> &CaptureProcessor<A, C> {
        &self.processor
    }

    /// Processes batches until the feed is caught up.
    pub async fn drain_once(&self) -> CaptureResult<CaptureReport> {
        let (_never, mut shutdown) = watch::channel(false);
        self.drain(&mut shutdown).await
    }

    async fn drain(&self, shutdown: &mut watch::Receiver<bool>) -> CaptureResult<CaptureReport> {
        let mut total = CaptureReport::default();
        while let Some(report) = self.poll_batch(shutdown).await? {
            total.absorb(report);
        }
        Ok(total)
    }

    /// Polls the feed every `poll_interval` until `shutdown` flips to true.
    ///
    /// Transient feed errors are logged and retried on the next tick. A
    /// halted batch ends the loop with its error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CaptureResult<()> {
        let mut ticker = interval(self.config.poll_interval);
        info!(
            consumer = CONSUMER_NAME,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Stream trigger started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.drain(&mut shutdown).await {
                Ok(report) if report.events_seen > 0 => {
                    info!(
                        events = report.events_seen,
                        archived = report.archived,
                        skipped = report.skipped,
                        "Capture pass complete"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Change feed unavailable, retrying next tick");
                }
                Err(e) => return Err(e),
            }
        }

        info!("Stream trigger stopped");
        Ok(())
    }

    /// Processes the next batch. `None` when the feed is caught up or
    /// shutdown arrived during a backoff wait.
    async fn poll_batch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> CaptureResult<Option<CaptureReport>> {
        let position = self.feed.consumer_position(CONSUMER_NAME)?;
        let batch = self.feed.read_changes(position, self.config.batch_size)?;
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return Ok(None);
        };
        let (first, last) = (first.sequence_number, last.sequence_number);

        let mut failures = 0u32;
        loop {
            match self.processor.process_batch(&batch) {
                Ok(report) => {
                    self.feed.commit_consumer_position(CONSUMER_NAME, last)?;
                    debug!(first, last, archived = report.archived, "Batch committed");
                    return Ok(Some(report));
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.max_retries {
                        return self.exhausted(first, last, batch.len(), e).map(Some);
                    }
                    let delay = compute_backoff(failures, &self.config);
                    warn!(
                        first,
                        last,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Capture batch failed, backing off"
                    );
                    if interrupted(delay, shutdown).await {
                        info!(first, last, "Shutdown during backoff, batch left uncommitted");
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn exhausted(
        &self,
        first: i64,
        last: i64,
        events: usize,
        err: CaptureError,
    ) -> CaptureResult<CaptureReport> {
        match self.config.failure_policy {
            CaptureFailurePolicy::Halt => {
                error!(first, last, error = %err, "Capture batch exhausted retries, halting");
                Err(err)
            }
            CaptureFailurePolicy::SkipBatch => {
                error!(
                    first,
                    last,
                    events,
                    error = %err,
                    "Capture batch exhausted retries, skipping"
                );
                self.feed.commit_consumer_position(CONSUMER_NAME, last)?;
                Ok(CaptureReport {
                    events_seen: events,
                    skipped: events,
                    ..CaptureReport::default()
                })
            }
        }
    }
}

/// Sleeps for `delay`. True when shutdown was requested first.
async fn interrupted(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
