//! ReplayScheduler processor.
//!
//! The ReplayScheduler is responsible for:
//! - Periodically re-ingesting the last `window_blocks` blocks of each chain
//! - Recording every run per chain as a `ReplayJob`
//! - Refusing to start a run while another one is in progress
//! - Retrying a failed run after `retry_delay`, up to `max_retries` times

use crate::config::ReplaySchedulerConfig;
use crate::entities::replay_job::{JobCounts, JobStoreError, ReplayJob, ReplayJobStore};
use crate::services::chain::{ChainProvider, ProviderError};
use crate::services::metrics::{MetricsSink, names};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("chain {chain_id}: {source}")]
    Provider {
        chain_id: i64,
        #[source]
        source: ProviderError,
    },

    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("chain {chain_id}: block height {height} out of range")]
    HeightOutOfRange { chain_id: i64, height: u64 },

    #[error("a replay is already running")]
    AlreadyRunning,

    #[error("replay scheduler is shutting down")]
    Stopped,
}

/// Result of a scheduled [`ReplayScheduler::tick`].
#[derive(Debug)]
pub enum TickOutcome {
    /// A previous run was still in progress, or the scheduler is stopping.
    Skipped,
    /// One finished job per configured chain.
    Completed(Vec<ReplayJob>),
    /// The run failed; `retry_scheduled` tells whether another attempt is pending.
    Failed {
        error: ReplayError,
        retry_scheduled: bool,
    },
}

/// Clears the running flag on every exit path.
struct RunGuard<'a> {
    running: &'a watch::Sender<bool>,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a watch::Sender<bool>) -> Option<Self> {
        running
            .send_if_modified(|busy| !std::mem::replace(busy, true))
            .then_some(Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.send_replace(false);
    }
}

struct SchedulerInner {
    config: ReplaySchedulerConfig,
    provider: Arc<dyn ChainProvider>,
    jobs: Arc<dyn ReplayJobStore>,
    metrics: Arc<dyn MetricsSink>,
    running: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    retry_count: AtomicU32,
    /// Set from scheduling until the retry's delay has elapsed.
    retry_waiting: AtomicBool,
    pending_retry: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share the running flag and retry state.
#[derive(Clone)]
pub struct ReplayScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReplayScheduler {
    pub fn new(
        config: ReplaySchedulerConfig,
        provider: Arc<dyn ChainProvider>,
        jobs: Arc<dyn ReplayJobStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                provider,
                jobs,
                metrics,
                running: watch::Sender::new(false),
                stopped: watch::Sender::new(false),
                retry_count: AtomicU32::new(0),
                retry_waiting: AtomicBool::new(false),
                pending_retry: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    fn is_stopped(&self) -> bool {
        *self.inner.stopped.borrow()
    }

    /// Consecutive failed runs since the last success.
    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count.load(Ordering::Acquire)
    }

    /// Whether a delayed retry is waiting or running.
    pub fn has_pending_retry(&self) -> bool {
        self.inner
            .pending_retry
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Scheduled entry point: run a replay unless one is in progress, and
    /// route a failure to the retry policy.
    pub async fn tick(&self) -> TickOutcome {
        match self.execute_replay().await {
            Ok(jobs) => TickOutcome::Completed(jobs),
            Err(ReplayError::AlreadyRunning) => {
                warn!("Previous replay still running, skipping tick");
                TickOutcome::Skipped
            }
            Err(ReplayError::Stopped) => {
                info!("Replay scheduler stopping, skipping tick");
                TickOutcome::Skipped
            }
            Err(error) => {
                error!(error = %error, "Replay failed");
                let retry_scheduled = self.handle_failure(&error);
                TickOutcome::Failed {
                    error,
                    retry_scheduled,
                }
            }
        }
    }

    /// Replay the recent window of every configured chain, in order.
    ///
    /// Fails with [`ReplayError::AlreadyRunning`] without side effects when
    /// another run holds the guard, and with [`ReplayError::Stopped`] once
    /// [`shutdown`](Self::shutdown) has begun.
    pub async fn execute_replay(&self) -> Result<Vec<ReplayJob>, ReplayError> {
        let Some(_guard) = RunGuard::acquire(&self.inner.running) else {
            return Err(ReplayError::AlreadyRunning);
        };
        if self.is_stopped() {
            return Err(ReplayError::Stopped);
        }

        info!(chains = self.inner.config.chains.len(), "Replay started");
        let started = Instant::now();
        let result = self.inner.replay_all_chains().await;
        let elapsed = started.elapsed().as_secs_f64();
        self.inner
            .metrics
            .observe_histogram(names::REPLAY_DURATION, &[], elapsed);

        match &result {
            Ok(jobs) => {
                self.inner.metrics.increment_counter(names::REPLAY_SUCCESS, &[]);
                self.inner.retry_count.store(0, Ordering::Release);
                info!(jobs = jobs.len(), elapsed_secs = elapsed, "Replay finished");
            }
            Err(_) => {
                self.inner.metrics.increment_counter(names::REPLAY_FAILURE, &[]);
            }
        }
        result
    }

    /// Count the failure and schedule one delayed retry if any are left.
    ///
    /// At most one retry waits at a time: a failure that arrives while a
    /// retry is still waiting is covered by that retry and not counted.
    /// Returns whether a retry is scheduled.
    pub fn handle_failure(&self, error: &ReplayError) -> bool {
        let mut pending = self.inner.pending_retry.lock();
        if self.is_stopped() {
            info!(error = %error, "Replay scheduler stopping, not retrying");
            return false;
        }
        if self.inner.retry_waiting.load(Ordering::Acquire) {
            info!(error = %error, "Replay retry already scheduled");
            return true;
        }

        let attempt = self.inner.retry_count.fetch_add(1, Ordering::AcqRel) + 1;
        let max_retries = self.inner.config.max_retries;

        if attempt > max_retries {
            error!(
                retry_count = attempt,
                max_retries,
                error = %error,
                "Replay retries exhausted, manual intervention required"
            );
            return false;
        }

        let delay = self.inner.config.retry_delay;
        warn!(
            retry_count = attempt,
            max_retries,
            delay_secs = delay.as_secs(),
            "Scheduling replay retry"
        );

        let scheduler = self.clone();
        let mut stopped_rx = self.inner.stopped.subscribe();
        self.inner.retry_waiting.store(true, Ordering::Release);
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = async {
                    let _ = stopped_rx.wait_for(|stopped| *stopped).await;
                } => {
                    scheduler.inner.retry_waiting.store(false, Ordering::Release);
                    info!(retry_count = attempt, "Replay retry cancelled");
                    return;
                }
            }
            scheduler.inner.retry_waiting.store(false, Ordering::Release);

            match scheduler.execute_replay().await {
                Ok(_) => info!(retry_count = attempt, "Replay retry succeeded"),
                Err(ReplayError::AlreadyRunning) => {
                    info!("Replay already running, dropping scheduled retry");
                }
                Err(ReplayError::Stopped) => {
                    info!("Replay scheduler stopping, dropping scheduled retry");
                }
                Err(error) => {
                    error!(retry_count = attempt, error = %error, "Replay retry failed");
                    scheduler.handle_failure(&error);
                }
            }
        });
        // Only a retry past its delay can schedule the next one, so the
        // handle being replaced belongs to a task that is finishing.
        *pending = Some(handle);
        true
    }

    /// Drive [`tick`](Self::tick) every `tick_interval` until shutdown.
    ///
    /// The first tick fires one interval after start.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.inner.config.tick_interval.as_secs(),
            "ReplayScheduler started"
        );
        let period = self.inner.config.tick_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("ReplayScheduler received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        self.shutdown().await;
        info!("ReplayScheduler shutdown complete");
    }

    /// Stop scheduling work and wait for what is in flight.
    ///
    /// A retry still waiting out its delay is cancelled. A run that already
    /// started, scheduled or manual, finishes so its jobs reach a terminal
    /// status. Later ticks are skipped.
    pub async fn shutdown(&self) {
        self.inner.stopped.send_replace(true);

        loop {
            let handle = self.inner.pending_retry.lock().take();
            let Some(handle) = handle else { break };
            if let Err(e) = handle.await {
                error!(error = %e, "Replay retry task failed");
            }
        }

        let mut running_rx = self.inner.running.subscribe();
        let idle = running_rx.wait_for(|running| !*running).await.is_ok();
        if !idle {
            warn!("Replay running flag dropped during shutdown");
        }
    }
}

impl SchedulerInner {
    async fn replay_all_chains(&self) -> Result<Vec<ReplayJob>, ReplayError> {
        let mut jobs = Vec::with_capacity(self.config.chains.len());
        for &chain_id in &self.config.chains {
            jobs.push(self.replay_chain(chain_id).await?);
        }
        Ok(jobs)
    }

    async fn replay_chain(&self, chain_id: i64) -> Result<ReplayJob, ReplayError> {
        let height = self
            .provider
            .current_block_height(chain_id)
            .await
            .map_err(|source| ReplayError::Provider { chain_id, source })?;
        let end_block = i64::try_from(height)
            .map_err(|_| ReplayError::HeightOutOfRange { chain_id, height })?;
        let window = i64::try_from(self.config.window_blocks).unwrap_or(i64::MAX);
        let start_block = end_block.saturating_sub(window).max(0);

        let job = self.jobs.create(chain_id, start_block, end_block).await?;
        info!(
            job_id = %job.id,
            chain_id,
            start_block,
            end_block,
            "Replay job started"
        );

        let replayed = self
            .provider
            .replay(
                chain_id,
                start_block as u64,
                end_block as u64,
                self.config.batch_size,
            )
            .await;

        match replayed {
            Ok(counts) => {
                let job = self
                    .jobs
                    .complete(
                        job.id,
                        JobCounts {
                            processed_events: i64::try_from(counts.processed).unwrap_or(i64::MAX),
                            failed_events: i64::try_from(counts.failed).unwrap_or(i64::MAX),
                        },
                    )
                    .await?;

                let chain = chain_id.to_string();
                self.metrics.add_counter(
                    names::REPLAY_EVENTS,
                    &[("chain_id", chain.clone()), ("status", "processed".to_string())],
                    counts.processed,
                );
                self.metrics.add_counter(
                    names::REPLAY_EVENTS,
                    &[("chain_id", chain.clone()), ("status", "failed".to_string())],
                    counts.failed,
                );
                self.metrics.set_gauge(
                    names::LAST_REPLAY_BLOCK,
                    &[("chain_id", chain)],
                    end_block as f64,
                );

                info!(
                    job_id = %job.id,
                    chain_id,
                    processed = counts.processed,
                    failed = counts.failed,
                    "Replay job completed"
                );
                Ok(job)
            }
            Err(source) => {
                let message = source.to_string();
                if let Err(e) = self.jobs.fail(job.id, &message).await {
                    error!(job_id = %job.id, error = %e, "Failed to mark replay job failed");
                }
                warn!(job_id = %job.id, chain_id, error = %message, "Replay job failed");
                Err(ReplayError::Provider { chain_id, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::JobStatus;
    use crate::entities::replay_job::MemoryReplayJobStore;
    use crate::services::chain::ReplayCounts;
    use crate::testing::{FakeChainProvider, RecordingMetrics, ReplayCall, settle};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Harness {
        scheduler: ReplayScheduler,
        provider: Arc<FakeChainProvider>,
        jobs: Arc<MemoryReplayJobStore>,
        metrics: Arc<RecordingMetrics>,
    }

    fn config(chains: Vec<i64>) -> ReplaySchedulerConfig {
        ReplaySchedulerConfig {
            chains,
            ..ReplaySchedulerConfig::default()
        }
    }

    fn harness(config: ReplaySchedulerConfig, provider: FakeChainProvider) -> Harness {
        let provider = Arc::new(provider);
        let jobs = Arc::new(MemoryReplayJobStore::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let scheduler = ReplayScheduler::new(config, provider.clone(), jobs.clone(), metrics.clone());
        Harness {
            scheduler,
            provider,
            jobs,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_successful_tick_records_jobs() {
        let h = harness(
            config(vec![1, 56]),
            FakeChainProvider::at_height(1_000).then(Ok(ReplayCounts {
                processed: 7,
                failed: 2,
            })),
        );

        let TickOutcome::Completed(jobs) = h.scheduler.tick().await else {
            panic!("expected a completed run");
        };
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.status == JobStatus::Success));
        assert_eq!(jobs[0].processed_events, 7);
        assert_eq!(jobs[0].failed_events, 2);

        assert_eq!(
            h.provider.calls()[0],
            ReplayCall {
                chain_id: 1,
                start_block: 700,
                end_block: 1_000,
                batch_size: 100,
            }
        );
        assert_eq!(h.metrics.get("replay_success"), 1.0);
        assert_eq!(h.metrics.get("replay_duration_seconds"), 1.0);
        assert_eq!(h.metrics.get("last_replay_block{chain_id=56}"), 1_000.0);
        assert_eq!(h.metrics.get("replay_events{chain_id=1,status=processed}"), 7.0);
        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_window_is_clamped_at_genesis() {
        let h = harness(config(vec![1]), FakeChainProvider::at_height(120));
        h.scheduler.tick().await;
        assert_eq!(h.provider.calls()[0].start_block, 0);
        assert_eq!(h.provider.calls()[0].end_block, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_skipped() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000).gated(gate.clone()),
        );

        let first = {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        settle().await;
        assert!(h.scheduler.is_running());

        assert!(matches!(h.scheduler.tick().await, TickOutcome::Skipped));
        assert_eq!(h.provider.calls().len(), 1);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), TickOutcome::Completed(_)));
        assert!(!h.scheduler.is_running());
        assert_eq!(h.jobs.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_marks_job_and_schedules_retry() {
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000).always_failing(),
        );

        let TickOutcome::Failed {
            error,
            retry_scheduled,
        } = h.scheduler.tick().await
        else {
            panic!("expected a failed run");
        };
        assert!(retry_scheduled);
        assert!(matches!(error, ReplayError::Provider { chain_id: 1, .. }));
        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.retry_count(), 1);
        assert!(h.scheduler.has_pending_retry());

        let jobs = h.jobs.recent(10).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert_eq!(jobs[0].error.as_deref(), Some("malformed RPC response: node unreachable"));
        assert!(jobs[0].end_time.is_some());
        assert_eq!(h.metrics.get("replay_failure"), 1.0);

        // The retry fires after the configured delay and fails again.
        tokio::time::sleep(Duration::from_secs(5 * 60) + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(h.provider.calls().len(), 2);
        assert_eq!(h.scheduler.retry_count(), 2);
        assert!(h.scheduler.has_pending_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_after_max() {
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000).always_failing(),
        );
        let delay = Duration::from_secs(5 * 60);

        h.scheduler.tick().await;
        for _ in 0..5 {
            tokio::time::sleep(delay + Duration::from_millis(1)).await;
            settle().await;
        }

        // One scheduled run plus three retries.
        assert_eq!(h.provider.calls().len(), 4);
        assert_eq!(h.scheduler.retry_count(), 4);
        assert!(!h.scheduler.has_pending_retry());
        assert_eq!(h.metrics.get("replay_failure"), 4.0);
        assert_eq!(h.jobs.stats().await.unwrap()[&JobStatus::Failed].count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_retry_resets_retry_count() {
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000)
                .then(Err(ProviderError::UnknownChain(1)))
                .then(Ok(ReplayCounts::default())),
        );

        assert!(matches!(
            h.scheduler.tick().await,
            TickOutcome::Failed {
                retry_scheduled: true,
                ..
            }
        ));
        tokio::time::sleep(Duration::from_secs(5 * 60) + Duration::from_millis(1)).await;
        settle().await;

        assert_eq!(h.provider.calls().len(), 2);
        assert_eq!(h.scheduler.retry_count(), 0);
        assert_eq!(h.metrics.get("replay_success"), 1.0);

        let stats = h.jobs.stats().await.unwrap();
        assert_eq!(stats[&JobStatus::Failed].count, 1);
        assert_eq!(stats[&JobStatus::Success].count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_and_stops_on_shutdown() {
        let h = harness(
            ReplaySchedulerConfig {
                tick_interval: Duration::from_secs(60),
                ..config(vec![1])
            },
            FakeChainProvider::at_height(1_000),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.scheduler.clone().run(shutdown_rx));

        settle().await;
        assert!(h.provider.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(150)).await;
        settle().await;
        assert_eq!(h.provider.calls().len(), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_tick_while_retry_waits_keeps_one_retry() {
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000).always_failing(),
        );
        let delay = Duration::from_secs(5 * 60);

        h.scheduler.tick().await;
        assert_eq!(h.scheduler.retry_count(), 1);

        // A manual tick fails while the first retry is still waiting.
        assert!(matches!(
            h.scheduler.tick().await,
            TickOutcome::Failed {
                retry_scheduled: true,
                ..
            }
        ));
        assert_eq!(h.scheduler.retry_count(), 1);
        assert_eq!(h.provider.calls().len(), 2);

        tokio::time::sleep(delay + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(h.provider.calls().len(), 3);
        assert_eq!(h.scheduler.retry_count(), 2);

        h.scheduler.shutdown().await;
        assert!(!h.scheduler.has_pending_retry());
        tokio::time::sleep(delay * 3).await;
        settle().await;
        assert_eq!(h.provider.calls().len(), 3);

        assert!(matches!(h.scheduler.tick().await, TickOutcome::Skipped));
        assert_eq!(h.provider.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_started_retry_finish() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            config(vec![1]),
            FakeChainProvider::at_height(1_000)
                .then(Err(ProviderError::UnknownChain(1)))
                .then(Ok(ReplayCounts::default()))
                .gated(gate.clone()),
        );

        gate.notify_one();
        assert!(matches!(
            h.scheduler.tick().await,
            TickOutcome::Failed {
                retry_scheduled: true,
                ..
            }
        ));

        tokio::time::sleep(Duration::from_secs(5 * 60) + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(h.provider.calls().len(), 2);
        assert!(h.scheduler.is_running());

        let stopping = {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.shutdown().await })
        };
        settle().await;
        assert!(!stopping.is_finished());

        gate.notify_one();
        stopping.await.unwrap();
        assert!(!h.scheduler.is_running());
        assert_eq!(h.scheduler.retry_count(), 0);

        let jobs = h.jobs.recent(10).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.status != JobStatus::Running));
        assert!(jobs.iter().all(|job| job.end_time.is_some()));
    }
}
