//! Metrics sink used by the processors.
//!
//! The core never talks to a metrics backend directly. It reports through
//! [`MetricsSink`], and the server installs [`FacadeMetrics`] which forwards
//! to the `metrics` crate facade (exported as Prometheus text).

use metrics::{Label, counter, gauge, histogram};

/// Metric names reported by the core.
pub mod names {
    pub const EVENTS_SUCCESS: &str = "events_success";
    pub const EVENTS_FAILURE: &str = "events_failure";
    pub const EVENTS_DUPLICATE: &str = "events_duplicate";
    pub const EVENT_PROCESS_DURATION: &str = "event_process_duration_seconds";
    pub const QUEUE_SIZE: &str = "queue_size";
    pub const REPLAY_SUCCESS: &str = "replay_success";
    pub const REPLAY_FAILURE: &str = "replay_failure";
    pub const REPLAY_DURATION: &str = "replay_duration_seconds";
    pub const REPLAY_EVENTS: &str = "replay_events";
    pub const LAST_REPLAY_BLOCK: &str = "last_replay_block";
    pub const NOTIFICATION_SKIPPED: &str = "notification_skipped";
}

/// Label set attached to a single observation.
pub type MetricLabels<'a> = &'a [(&'static str, String)];

/// Destination for counters, gauges and histograms.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: MetricLabels<'_>);

    fn add_counter(&self, name: &'static str, labels: MetricLabels<'_>, value: u64);

    fn set_gauge(&self, name: &'static str, labels: MetricLabels<'_>, value: f64);

    fn observe_histogram(&self, name: &'static str, labels: MetricLabels<'_>, value: f64);
}

/// Forwards everything to the global `metrics` recorder.
///
/// If no recorder is installed the calls are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeMetrics;

fn to_labels(labels: MetricLabels<'_>) -> Vec<Label> {
    labels
        .iter()
        .map(|(key, value)| Label::new(*key, value.clone()))
        .collect()
}

impl MetricsSink for FacadeMetrics {
    fn increment_counter(&self, name: &'static str, labels: MetricLabels<'_>) {
        counter!(name, to_labels(labels)).increment(1);
    }

    fn add_counter(&self, name: &'static str, labels: MetricLabels<'_>, value: u64) {
        counter!(name, to_labels(labels)).increment(value);
    }

    fn set_gauge(&self, name: &'static str, labels: MetricLabels<'_>, value: f64) {
        gauge!(name, to_labels(labels)).set(value);
    }

    fn observe_histogram(&self, name: &'static str, labels: MetricLabels<'_>, value: f64) {
        histogram!(name, to_labels(labels)).record(value);
    }
}
