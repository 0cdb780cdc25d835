//! Replay scheduler configuration.

use std::time::Duration;

/// Configuration for the [`ReplayScheduler`](crate::processors::ReplayScheduler).
#[derive(Debug, Clone)]
pub struct ReplaySchedulerConfig {
    /// Chains replayed on every run, in order.
    pub chains: Vec<i64>,
    /// How many blocks behind the current height a run starts.
    /// The default is roughly one hour of 12-second blocks.
    pub window_blocks: u64,
    /// Batch size handed to the bulk replay.
    pub batch_size: u64,
    /// Scheduler-level retries after a failed run.
    pub max_retries: u32,
    /// Delay before a retry of a failed run.
    pub retry_delay: Duration,
    /// Cadence of `tick()` when driven by [`run`](crate::processors::ReplayScheduler::run).
    pub tick_interval: Duration,
}

impl Default for ReplaySchedulerConfig {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            window_blocks: 300,
            batch_size: 100,
            max_retries: 3,
            retry_delay: Duration::from_secs(5 * 60),
            tick_interval: Duration::from_secs(60 * 60),
        }
    }
}
