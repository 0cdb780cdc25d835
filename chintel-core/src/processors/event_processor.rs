//! EventProcessor.
//!
//! The EventProcessor is responsible for:
//! - Dropping duplicate submissions inside the dedup window
//! - Running each event through store -> score -> notify on the WorkQueue
//! - Classifying failures and moving the event through its status machine
//! - Reporting outcomes as logs and metrics
//!
//! A single attempt never re-enqueues itself. Retryable failures resolve to
//! [`ProcessOutcome::Retry`]; [`EventProcessor::drive`] (used by the ingest
//! runner and the replay provider) re-submits them after a backoff delay.

use crate::config::ProcessorConfig;
use crate::entities::transfer_event::{EventKey, EventStore, EventUpdate, StorageError};
use crate::notification::{NotificationRouter, RouteDecision};
use crate::queue::{DedupWindow, Fingerprint, QueueError, TaskHandle, WorkQueue};
use crate::services::metrics::{MetricsSink, names};
use crate::services::notifier::{NotificationChannel, Notifier, TransportError};
use crate::services::scorer::{AnalysisError, Scorer};
use crate::utils::backoff::calculate_retry_delay;
use chintel_sdk::objects::{EventStatus, RiskLevel, RiskResult, TransferEvent};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why a processing attempt failed.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("notification error: {0}")]
    Notification(#[from] TransportError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ProcessError {
    /// Label used for the `events_failure` metric.
    pub fn failure_type(&self) -> &'static str {
        match self {
            ProcessError::Storage(_) => "storage",
            ProcessError::Analysis(_) => "analysis",
            ProcessError::Notification(_) => "notification",
            ProcessError::Queue(QueueError::Timeout(_)) => "timeout",
            ProcessError::Queue(QueueError::Aborted) => "general",
        }
    }

    /// Scoring failures are deterministic; everything else may pass later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProcessError::Analysis(_))
    }
}

/// Result of one processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The event reached `success`, `failed` or `ai_failed`.
    Completed(TransferEvent),
    /// Retryable failure; the event is `pending` and should be re-submitted.
    Retry(TransferEvent),
}

impl ProcessOutcome {
    pub fn event(&self) -> &TransferEvent {
        match self {
            ProcessOutcome::Completed(event) | ProcessOutcome::Retry(event) => event,
        }
    }

    pub fn into_event(self) -> TransferEvent {
        match self {
            ProcessOutcome::Completed(event) | ProcessOutcome::Retry(event) => event,
        }
    }
}

/// Result of [`EventProcessor::submit`].
#[must_use]
pub enum SubmitOutcome {
    /// Seen within the dedup window; nothing was queued.
    Duplicate,
    Enqueued(ProcessHandle),
}

/// External collaborators of the processor.
pub struct EventCollaborators {
    pub store: Arc<dyn EventStore>,
    pub scorer: Arc<dyn Scorer>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<dyn MetricsSink>,
}

struct ProcessorInner {
    config: ProcessorConfig,
    router: NotificationRouter,
    store: Arc<dyn EventStore>,
    scorer: Arc<dyn Scorer>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn MetricsSink>,
    /// Channels that already received the alert for an event still in flight.
    delivered: Mutex<HashMap<Fingerprint, HashSet<NotificationChannel>>>,
}

/// Resolves to the outcome of one queued attempt.
#[must_use = "a process handle does nothing unless awaited"]
pub struct ProcessHandle {
    task: TaskHandle<ProcessOutcome>,
    /// Copy of the event as submitted, used when the attempt never finished.
    event: TransferEvent,
    inner: Arc<ProcessorInner>,
    queue: WorkQueue,
}

impl ProcessHandle {
    pub async fn outcome(self) -> ProcessOutcome {
        let ProcessHandle {
            task,
            event,
            inner,
            queue,
        } = self;

        let outcome = match task.await {
            Ok(outcome) => outcome,
            // The attempt was dropped mid-flight; classify it like any other failure.
            Err(queue_error) => inner.handle_failure(event, queue_error.into()).await,
        };
        if let ProcessOutcome::Completed(event) = &outcome {
            inner.delivered.lock().remove(&Fingerprint::from(event));
        }
        inner.report_queue_size(&queue);
        outcome
    }
}

/// Runs events through the processing pipeline.
///
/// Cheap to clone; clones share the queue, dedup window and collaborators.
#[derive(Clone)]
pub struct EventProcessor {
    inner: Arc<ProcessorInner>,
    queue: WorkQueue,
    dedup: Arc<DedupWindow>,
}

impl EventProcessor {
    pub fn new(
        config: ProcessorConfig,
        queue: WorkQueue,
        router: NotificationRouter,
        collaborators: EventCollaborators,
    ) -> Self {
        let dedup = Arc::new(DedupWindow::new(config.dedup_window));
        let EventCollaborators {
            store,
            scorer,
            notifier,
            metrics,
        } = collaborators;
        Self {
            inner: Arc::new(ProcessorInner {
                config,
                router,
                store,
                scorer,
                notifier,
                metrics,
                delivered: Mutex::new(HashMap::new()),
            }),
            queue,
            dedup,
        }
    }

    /// Queue a newly observed event unless it is a duplicate.
    pub fn submit(&self, event: TransferEvent) -> SubmitOutcome {
        let fingerprint = Fingerprint::from(&event);
        if self.dedup.seen(&fingerprint) {
            self.inner
                .metrics
                .increment_counter(names::EVENTS_DUPLICATE, &[]);
            debug!(fingerprint = %fingerprint, "Duplicate event skipped");
            return SubmitOutcome::Duplicate;
        }
        SubmitOutcome::Enqueued(self.enqueue(event))
    }

    /// Queue a retry of an event returned in [`ProcessOutcome::Retry`].
    ///
    /// Bypasses the dedup window, which already holds the event's fingerprint.
    pub fn resubmit(&self, event: TransferEvent) -> ProcessHandle {
        self.enqueue(event)
    }

    /// Await a handle and keep re-submitting the event after a backoff delay
    /// until it reaches a terminal status.
    pub async fn drive(&self, handle: ProcessHandle) -> TransferEvent {
        let mut handle = handle;
        loop {
            match handle.outcome().await {
                ProcessOutcome::Completed(event) => return event,
                ProcessOutcome::Retry(event) => {
                    let delay =
                        calculate_retry_delay(self.inner.config.retry_base_delay, event.retry_count);
                    debug!(
                        tx_hash = %event.tx_hash,
                        retry_count = event.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling event retry"
                    );
                    tokio::time::sleep(delay).await;
                    handle = self.resubmit(event);
                }
            }
        }
    }

    /// Wait until every queued and running attempt has finished.
    pub async fn shutdown(&self) {
        info!(in_flight = self.queue.size(), "Draining event queue");
        self.queue.wait_for_idle().await;
        info!("Event queue drained");
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    fn enqueue(&self, event: TransferEvent) -> ProcessHandle {
        let task = self
            .queue
            .enqueue(ProcessorInner::process(Arc::clone(&self.inner), event.clone()));
        self.inner.report_queue_size(&self.queue);
        ProcessHandle {
            task,
            event,
            inner: Arc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

impl ProcessorInner {
    async fn process(self: Arc<Self>, mut event: TransferEvent) -> ProcessOutcome {
        let started = Instant::now();
        let result = self.run_pipeline(&mut event).await;
        self.metrics.observe_histogram(
            names::EVENT_PROCESS_DURATION,
            &[],
            started.elapsed().as_secs_f64(),
        );

        match result {
            Ok(()) => {
                self.metrics.increment_counter(names::EVENTS_SUCCESS, &[]);
                info!(
                    chain_id = event.chain_id,
                    tx_hash = %event.tx_hash,
                    retry_count = event.retry_count,
                    risk_level = ?event.risk_result.as_ref().map(|r| r.level),
                    "Event processed"
                );
                ProcessOutcome::Completed(event)
            }
            Err(e) => self.handle_failure(event, e).await,
        }
    }

    async fn run_pipeline(&self, event: &mut TransferEvent) -> Result<(), ProcessError> {
        event.status = EventStatus::Processing;
        self.persist(event).await?;

        self.store.save(event).await?;

        let risk = self.scorer.score(event).await?;
        debug!(
            tx_hash = %event.tx_hash,
            score = risk.score,
            level = %risk.level,
            "Event scored"
        );

        if risk.level >= RiskLevel::High {
            self.notify(event, &risk).await?;
        }

        event.status = EventStatus::Success;
        event.risk_result = Some(risk);
        event.last_error = None;
        self.persist(event).await?;
        Ok(())
    }

    /// Send the alert to every routed channel that has not received it yet.
    ///
    /// Successful channels are remembered until the event reaches a terminal
    /// status, so a retry after a partial failure only resends the rest.
    async fn notify(&self, event: &TransferEvent, risk: &RiskResult) -> Result<(), ProcessError> {
        match self.router.decide(event, risk) {
            RouteDecision::Skip(reason) => {
                self.metrics
                    .increment_counter(names::NOTIFICATION_SKIPPED, &[("reason", reason.to_string())]);
                info!(
                    tx_hash = %event.tx_hash,
                    reason = %reason,
                    "High-risk event not alerted"
                );
                Ok(())
            }
            RouteDecision::Send(notification) => {
                let fingerprint = Fingerprint::from(event);
                let already = self
                    .delivered
                    .lock()
                    .get(&fingerprint)
                    .cloned()
                    .unwrap_or_default();
                let pending: Vec<NotificationChannel> = notification
                    .channels
                    .iter()
                    .copied()
                    .filter(|channel| !already.contains(channel))
                    .collect();

                let results = join_all(pending.iter().map(|channel| {
                    self.notifier
                        .send(*channel, event, risk, &notification.content)
                }))
                .await;

                let mut first_error = None;
                {
                    let mut delivered = self.delivered.lock();
                    for (channel, result) in pending.iter().zip(results) {
                        match result {
                            Ok(()) => {
                                delivered
                                    .entry(fingerprint.clone())
                                    .or_default()
                                    .insert(*channel);
                            }
                            Err(e) => {
                                warn!(
                                    tx_hash = %event.tx_hash,
                                    channel = %channel,
                                    error = %e,
                                    "Alert delivery failed"
                                );
                                first_error.get_or_insert(e);
                            }
                        }
                    }
                }
                if let Some(e) = first_error {
                    return Err(e.into());
                }

                info!(
                    tx_hash = %event.tx_hash,
                    level = %risk.level,
                    channels = pending.len(),
                    previously_delivered = already.len(),
                    emergency = notification.emergency,
                    "High-risk alert sent"
                );
                Ok(())
            }
        }
    }

    async fn persist(&self, event: &TransferEvent) -> Result<bool, StorageError> {
        self.store
            .update(&EventKey::from(event), EventUpdate::from(event))
            .await
    }

    async fn persist_logged(&self, event: &TransferEvent) {
        if let Err(e) = self.persist(event).await {
            error!(
                tx_hash = %event.tx_hash,
                status = %event.status,
                error = %e,
                "Failed to persist event status"
            );
        }
    }

    async fn handle_failure(&self, mut event: TransferEvent, error: ProcessError) -> ProcessOutcome {
        self.metrics.increment_counter(
            names::EVENTS_FAILURE,
            &[("type", error.failure_type().to_string())],
        );
        event.last_error = Some(error.to_string());

        if !error.is_retryable() {
            event.status = EventStatus::AiFailed;
            self.persist_logged(&event).await;
            warn!(
                tx_hash = %event.tx_hash,
                error = %error,
                "Event scoring failed"
            );
            return ProcessOutcome::Completed(event);
        }

        event.retry_count += 1;
        if event.retry_count < self.config.max_retries {
            event.status = EventStatus::Pending;
            self.persist_logged(&event).await;
            warn!(
                tx_hash = %event.tx_hash,
                failure = error.failure_type(),
                retry_count = event.retry_count,
                error = %error,
                "Event processing failed, will retry"
            );
            ProcessOutcome::Retry(event)
        } else {
            event.status = EventStatus::Failed;
            self.persist_logged(&event).await;
            error!(
                tx_hash = %event.tx_hash,
                failure = error.failure_type(),
                retry_count = event.retry_count,
                error = %error,
                "Event processing failed permanently"
            );
            ProcessOutcome::Completed(event)
        }
    }

    fn report_queue_size(&self, queue: &WorkQueue) {
        self.metrics
            .set_gauge(names::QUEUE_SIZE, &[], queue.size() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::entities::transfer_event::MemoryEventStore;
    use crate::testing::{
        FlakyEventStore, RecordingMetrics, ScriptedNotifier, ScriptedScorer, risk, settle,
        transfer,
    };
    use std::time::Duration;

    struct Harness {
        processor: EventProcessor,
        store: Arc<FlakyEventStore>,
        scorer: Arc<ScriptedScorer>,
        notifier: Arc<ScriptedNotifier>,
        metrics: Arc<RecordingMetrics>,
    }

    fn harness(store: FlakyEventStore, scorer: ScriptedScorer, notifier: ScriptedNotifier) -> Harness {
        harness_with_queue(store, scorer, notifier, QueueConfig::default())
    }

    fn harness_with_queue(
        store: FlakyEventStore,
        scorer: ScriptedScorer,
        notifier: ScriptedNotifier,
        queue: QueueConfig,
    ) -> Harness {
        let store = Arc::new(store);
        let scorer = Arc::new(scorer);
        let notifier = Arc::new(notifier);
        let metrics = Arc::new(RecordingMetrics::default());
        let processor = EventProcessor::new(
            ProcessorConfig::default(),
            WorkQueue::new(queue),
            NotificationRouter::default(),
            EventCollaborators {
                store: store.clone(),
                scorer: scorer.clone(),
                notifier: notifier.clone(),
                metrics: metrics.clone(),
            },
        );
        Harness {
            processor,
            store,
            scorer,
            notifier,
            metrics,
        }
    }

    async fn run_once(processor: &EventProcessor, event: TransferEvent) -> ProcessOutcome {
        match processor.submit(event) {
            SubmitOutcome::Enqueued(handle) => handle.outcome().await,
            SubmitOutcome::Duplicate => panic!("unexpected duplicate"),
        }
    }

    #[tokio::test]
    async fn test_low_risk_event_succeeds_without_alert() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low)),
            ScriptedNotifier::default(),
        );
        let event = transfer("0xlow");

        let outcome = run_once(&h.processor, event.clone()).await;
        let ProcessOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.status, EventStatus::Success);
        assert_eq!(done.retry_count, 0);
        assert_eq!(done.risk_result.map(|r| r.level), Some(RiskLevel::Low));
        assert_eq!(h.notifier.attempts(), 0);

        let stored = h.store.stored(&event).unwrap();
        assert_eq!(stored.status, EventStatus::Success);
        assert!(stored.risk_result.is_some());
        assert_eq!(h.metrics.get("events_success"), 1.0);
        assert_eq!(h.metrics.get("event_process_duration_seconds"), 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_dropped() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low)),
            ScriptedNotifier::default(),
        );

        let first = h.processor.submit(transfer("0xdup"));
        let second = h.processor.submit(transfer("0xdup"));
        assert!(matches!(second, SubmitOutcome::Duplicate));

        let SubmitOutcome::Enqueued(handle) = first else {
            panic!("first submission must be queued");
        };
        handle.outcome().await;
        assert_eq!(h.scorer.calls(), 1);
        assert_eq!(h.store.saves(), 1);
        assert_eq!(h.metrics.get("events_duplicate"), 1.0);
    }

    #[tokio::test]
    async fn test_high_risk_event_is_alerted() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.8, RiskLevel::High)),
            ScriptedNotifier::default(),
        );

        let outcome = run_once(&h.processor, transfer("0xhigh")).await;
        assert_eq!(outcome.event().status, EventStatus::Success);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, NotificationChannel::Telegram);
        assert_eq!(sent[0].tx_hash, "0xhigh");
        assert!(sent[0].content.contains("[HIGH]"));
    }

    #[tokio::test]
    async fn test_skipped_alert_still_succeeds() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.8, RiskLevel::High)),
            ScriptedNotifier::default(),
        );
        let mut event = transfer("0xbatch");
        event.batch_operation = true;

        let outcome = run_once(&h.processor, event).await;
        assert_eq!(outcome.event().status, EventStatus::Success);
        assert_eq!(h.notifier.attempts(), 0);
        assert_eq!(h.metrics.get("notification_skipped{reason=batch_cached}"), 1.0);
    }

    #[tokio::test]
    async fn test_scoring_failure_is_terminal_ai_failed() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.8, RiskLevel::High))
                .then(Err(AnalysisError::Model("model offline".to_string()))),
            ScriptedNotifier::default(),
        );
        let event = transfer("0xai");

        let outcome = run_once(&h.processor, event.clone()).await;
        let ProcessOutcome::Completed(done) = outcome else {
            panic!("analysis failures are not retried");
        };
        assert_eq!(done.status, EventStatus::AiFailed);
        assert_eq!(done.retry_count, 0);
        assert!(done.last_error.unwrap().contains("model offline"));
        assert_eq!(h.notifier.attempts(), 0);

        let stored = h.store.stored(&event).unwrap();
        assert_eq!(stored.status, EventStatus::AiFailed);
        assert_eq!(stored.retry_count, 0);
        assert_eq!(h.metrics.get("events_failure{type=analysis}"), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoring_failure_after_retry_keeps_retry_count() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.8, RiskLevel::High))
                .then(Ok(risk(0.8, RiskLevel::High)))
                .then(Err(AnalysisError::Model("model offline".to_string()))),
            ScriptedNotifier::failing(1),
        );
        let event = transfer("0xlate");

        let SubmitOutcome::Enqueued(handle) = h.processor.submit(event.clone()) else {
            panic!("expected enqueue");
        };
        let done = h.processor.drive(handle).await;

        assert_eq!(done.status, EventStatus::AiFailed);
        assert_eq!(done.retry_count, 1);
        assert!(done.last_error.unwrap().contains("model offline"));
        assert_eq!(h.scorer.calls(), 2);
        assert_eq!(h.notifier.attempts(), 1);

        let stored = h.store.stored(&event).unwrap();
        assert_eq!(stored.status, EventStatus::AiFailed);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(h.metrics.get("events_failure{type=notification}"), 1.0);
        assert_eq!(h.metrics.get("events_failure{type=analysis}"), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_resends_undelivered_channels() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.95, RiskLevel::Critical)),
            ScriptedNotifier::failing(1),
        );

        let SubmitOutcome::Enqueued(handle) = h.processor.submit(transfer("0xcrit")) else {
            panic!("expected enqueue");
        };
        let done = h.processor.drive(handle).await;

        assert_eq!(done.status, EventStatus::Success);
        assert_eq!(done.retry_count, 1);
        // Two channels on the first attempt, only the failed one on the retry.
        assert_eq!(h.notifier.attempts(), 3);
        let mut channels: Vec<NotificationChannel> =
            h.notifier.sent().iter().map(|alert| alert.channel).collect();
        channels.sort_by_key(|channel| channel.to_string());
        assert_eq!(
            channels,
            vec![NotificationChannel::Discord, NotificationChannel::Telegram]
        );
    }

    #[tokio::test]
    async fn test_storage_failure_asks_for_retry() {
        let h = harness(
            FlakyEventStore::failing_saves(1),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low)),
            ScriptedNotifier::default(),
        );

        let outcome = run_once(&h.processor, transfer("0xstore")).await;
        let ProcessOutcome::Retry(event) = outcome else {
            panic!("storage failures are retryable");
        };
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.retry_count, 1);
        assert_eq!(h.scorer.calls(), 0);
        assert_eq!(h.metrics.get("events_failure{type=storage}"), 1.0);

        let retried = h.processor.resubmit(event).outcome().await;
        assert_eq!(retried.event().status, EventStatus::Success);
        assert_eq!(retried.event().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifier_recovers_on_third_attempt() {
        let h = harness(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.8, RiskLevel::High)),
            ScriptedNotifier::failing(2),
        );
        let event = transfer("0xflaky");

        let SubmitOutcome::Enqueued(handle) = h.processor.submit(event.clone()) else {
            panic!("expected enqueue");
        };
        let done = h.processor.drive(handle).await;

        assert_eq!(done.status, EventStatus::Success);
        assert_eq!(done.retry_count, 2);
        assert_eq!(h.notifier.attempts(), 3);
        assert_eq!(h.notifier.sent().len(), 1);
        assert_eq!(h.store.stored(&event).unwrap().retry_count, 2);
        assert_eq!(h.metrics.get("events_failure{type=notification}"), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_exhausts_retries_and_fails() {
        let h = harness(
            FlakyEventStore::always_failing(),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low)),
            ScriptedNotifier::default(),
        );

        let SubmitOutcome::Enqueued(handle) = h.processor.submit(transfer("0xdead")) else {
            panic!("expected enqueue");
        };
        let done = h.processor.drive(handle).await;

        assert_eq!(done.status, EventStatus::Failed);
        assert_eq!(done.retry_count, 3);
        assert!(done.last_error.unwrap().contains("scripted storage failure"));
        assert_eq!(h.store.saves(), 3);
        assert_eq!(h.metrics.get("events_failure{type=storage}"), 3.0);
        assert_eq!(h.metrics.get("events_success"), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_is_retryable() {
        let h = harness_with_queue(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low))
                .with_delay(Duration::from_secs(60)),
            ScriptedNotifier::default(),
            QueueConfig {
                concurrency: 1,
                timeout: Duration::from_secs(30),
            },
        );
        let event = transfer("0xslow");

        let outcome = run_once(&h.processor, event.clone()).await;
        let ProcessOutcome::Retry(retry) = outcome else {
            panic!("timeouts are retryable");
        };
        assert_eq!(retry.status, EventStatus::Pending);
        assert_eq!(retry.retry_count, 1);
        assert!(retry.last_error.unwrap().contains("timed out"));
        assert_eq!(h.metrics.get("events_failure{type=timeout}"), 1.0);
        assert_eq!(h.store.stored(&event).unwrap().status, EventStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_in_flight_events() {
        let h = harness_with_queue(
            FlakyEventStore::default(),
            ScriptedScorer::returning(risk(0.1, RiskLevel::Low))
                .with_delay(Duration::from_secs(1)),
            ScriptedNotifier::default(),
            QueueConfig {
                concurrency: 2,
                timeout: Duration::from_secs(30),
            },
        );

        for i in 0..5 {
            let _ = h.processor.submit(transfer(&format!("0x{i}")));
        }
        settle().await;
        assert!(h.processor.queue().size() > 0);

        h.processor.shutdown().await;
        assert_eq!(h.processor.queue().size(), 0);
        assert_eq!(h.scorer.calls(), 5);
        assert_eq!(h.metrics.get("events_success"), 5.0);
    }

    #[test]
    fn test_failure_classification() {
        let storage = ProcessError::from(StorageError::Unavailable("down".to_string()));
        assert_eq!(storage.failure_type(), "storage");
        assert!(storage.is_retryable());

        let analysis = ProcessError::from(AnalysisError::Model("bad".to_string()));
        assert_eq!(analysis.failure_type(), "analysis");
        assert!(!analysis.is_retryable());

        let timeout = ProcessError::from(QueueError::Timeout(Duration::from_secs(30)));
        assert_eq!(timeout.failure_type(), "timeout");
        assert!(timeout.is_retryable());

        let aborted = ProcessError::from(QueueError::Aborted);
        assert_eq!(aborted.failure_type(), "general");
        assert!(aborted.is_retryable());
    }

    #[tokio::test]
    async fn test_memory_store_is_a_valid_collaborator() {
        let store = Arc::new(MemoryEventStore::new());
        let processor = EventProcessor::new(
            ProcessorConfig::default(),
            WorkQueue::default(),
            NotificationRouter::default(),
            EventCollaborators {
                store: store.clone(),
                scorer: Arc::new(ScriptedScorer::returning(risk(0.2, RiskLevel::Low))),
                notifier: Arc::new(ScriptedNotifier::default()),
                metrics: Arc::new(RecordingMetrics::default()),
            },
        );
        let event = transfer("0xmem");
        let outcome = run_once(&processor, event.clone()).await;
        assert_eq!(outcome.into_event().status, EventStatus::Success);
        assert_eq!(
            store.get(&EventKey::from(&event)).unwrap().status,
            EventStatus::Success
        );
    }
}
