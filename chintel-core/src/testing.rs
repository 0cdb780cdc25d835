//! Scripted collaborators for unit tests.

use crate::entities::transfer_event::{EventKey, EventStore, EventUpdate, MemoryEventStore, StorageError};
use crate::services::chain::{ChainProvider, ProviderError, ReplayCounts};
use crate::services::metrics::{MetricLabels, MetricsSink};
use crate::services::notifier::{NotificationChannel, Notifier, TransportError};
use crate::services::scorer::{AnalysisError, Scorer};
use async_trait::async_trait;
use chintel_sdk::objects::{RiskLevel, RiskResult, TransferEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

pub fn transfer(tx_hash: &str) -> TransferEvent {
    TransferEvent::new(1, tx_hash, "0xfrom", "0xto", "2.5", 1_700_000_000)
}

pub fn risk(score: f64, level: RiskLevel) -> RiskResult {
    RiskResult::new(score, level, vec!["scripted".to_string()])
}

/// Records every observation under `name{k=v,...}`.
///
/// Counters accumulate, gauges hold the last value, histograms count samples.
#[derive(Default)]
pub struct RecordingMetrics {
    values: Mutex<HashMap<String, f64>>,
}

impl RecordingMetrics {
    fn key(name: &str, labels: MetricLabels<'_>) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut pairs: Vec<_> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        format!("{name}{{{}}}", pairs.join(","))
    }

    /// Value recorded under a rendered key such as `events_failure{type=storage}`.
    pub fn get(&self, key: &str) -> f64 {
        self.values.lock().get(key).copied().unwrap_or(0.0)
    }
}

impl MetricsSink for RecordingMetrics {
    fn increment_counter(&self, name: &'static str, labels: MetricLabels<'_>) {
        self.add_counter(name, labels, 1);
    }

    fn add_counter(&self, name: &'static str, labels: MetricLabels<'_>, value: u64) {
        *self.values.lock().entry(Self::key(name, labels)).or_default() += value as f64;
    }

    fn set_gauge(&self, name: &'static str, labels: MetricLabels<'_>, value: f64) {
        self.values.lock().insert(Self::key(name, labels), value);
    }

    fn observe_histogram(&self, name: &'static str, labels: MetricLabels<'_>, _value: f64) {
        *self.values.lock().entry(Self::key(name, labels)).or_default() += 1.0;
    }
}

/// Returns scripted results in order, then a fallback.
pub struct ScriptedScorer {
    script: Mutex<VecDeque<Result<RiskResult, AnalysisError>>>,
    fallback: RiskResult,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn returning(fallback: RiskResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, result: Result<RiskResult, AnalysisError>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, _event: &TransferEvent) -> Result<RiskResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentAlert {
    pub channel: NotificationChannel,
    pub tx_hash: String,
    pub content: String,
}

/// Fails the first `failures` sends, then records deliveries.
#[derive(Default)]
pub struct ScriptedNotifier {
    failures: AtomicU32,
    attempts: AtomicUsize,
    sent: Mutex<Vec<SentAlert>>,
}

impl ScriptedNotifier {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        event: &TransferEvent,
        _risk: &RiskResult,
        content: &str,
    ) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransportError::Rejected("scripted transport failure".to_string()));
        }
        self.sent.lock().push(SentAlert {
            channel,
            tx_hash: event.tx_hash.clone(),
            content: content.to_string(),
        });
        Ok(())
    }
}

/// [`MemoryEventStore`] whose saves can be made to fail.
#[derive(Default)]
pub struct FlakyEventStore {
    pub inner: MemoryEventStore,
    save_failures: AtomicU32,
    always_fail: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyEventStore {
    pub fn failing_saves(failures: u32) -> Self {
        Self {
            save_failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn stored(&self, event: &TransferEvent) -> Option<TransferEvent> {
        self.inner.get(&EventKey::from(event))
    }
}

#[async_trait]
impl EventStore for FlakyEventStore {
    async fn save(&self, event: &TransferEvent) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let failed = self.always_fail.load(Ordering::SeqCst)
            || self
                .save_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
        if failed {
            return Err(StorageError::Unavailable("scripted storage failure".to_string()));
        }
        self.inner.save(event).await
    }

    async fn update(&self, key: &EventKey, update: EventUpdate) -> Result<bool, StorageError> {
        self.inner.update(key, update).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayCall {
    pub chain_id: i64,
    pub start_block: u64,
    pub end_block: u64,
    pub batch_size: u64,
}

/// Chain provider with a fixed height and scripted replay results.
pub struct FakeChainProvider {
    height: u64,
    script: Mutex<VecDeque<Result<ReplayCounts, ProviderError>>>,
    always_fail: AtomicBool,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<ReplayCall>>,
}

impl FakeChainProvider {
    pub fn at_height(height: u64) -> Self {
        Self {
            height,
            script: Mutex::new(VecDeque::new()),
            always_fail: AtomicBool::new(false),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, result: Result<ReplayCounts, ProviderError>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    pub fn always_failing(self) -> Self {
        self.always_fail.store(true, Ordering::SeqCst);
        self
    }

    /// Every replay waits for a notification on `gate` before returning.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<ReplayCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ChainProvider for FakeChainProvider {
    async fn current_block_height(&self, _chain_id: i64) -> Result<u64, ProviderError> {
        Ok(self.height)
    }

    async fn replay(
        &self,
        chain_id: i64,
        start_block: u64,
        end_block: u64,
        batch_size: u64,
    ) -> Result<ReplayCounts, ProviderError> {
        self.calls.lock().push(ReplayCall {
            chain_id,
            start_block,
            end_block,
            batch_size,
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Malformed("node unreachable".to_string()));
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(ReplayCounts {
            processed: 5,
            failed: 0,
        }))
    }
}
